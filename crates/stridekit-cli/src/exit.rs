// Exit codes for precise CI triage
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FATAL: i32 = 1;
pub const EXIT_MISMATCH: i32 = 2;
