pub const MAX_TENANTS: usize = 256;
pub const MAX_BRANCHES_PER_TENANT: usize = 512;
pub const MAX_TABLES_PER_BRANCH: usize = 1_000;
pub const MAX_RESERVATIONS_PER_BRANCH: usize = 100_000;
pub const MAX_OPENING_SLOTS: usize = 64;
pub const MAX_PARTY_SIZE: u32 = 1_000;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_LABEL_LEN: usize = 64;
pub const MAX_NOTE_LEN: usize = 2_048;
