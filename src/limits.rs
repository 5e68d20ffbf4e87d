/// Longest stay accepted by request validation, in nights.
pub const MAX_STAY_NIGHTS: i64 = 365;
pub const MAX_GUESTS: u32 = 64;
pub const MAX_SPECIAL_REQUESTS_LEN: usize = 2_000;
pub const MAX_REQUESTER_ID_LEN: usize = 128;
pub const MAX_RESERVATIONS_PER_CALENDAR: usize = 10_000;
pub const CURRENCY_CODE_LEN: usize = 3;
