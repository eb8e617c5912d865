//! Shared constants for end-to-end tests
//!
//! When the fixture dataset changes, update only this file.

// ============================================================================
// Song Metadata
// ============================================================================

pub const ARTIST_1_ID: &str = "AR001";
pub const ARTIST_1_NAME: &str = "Nomad";

pub const ARTIST_2_ID: &str = "ARD7TVE1187B99BFB1";
pub const ARTIST_2_NAME: &str = "Casual";

pub const SONG_1_ID: &str = "SOSMM";
pub const SONG_1_TITLE: &str = "Setanta";
pub const SONG_1_DURATION: f64 = 210.5;

pub const SONG_2_ID: &str = "SOMZWCG12A8C13C480";
pub const SONG_2_TITLE: &str = "I Didn't Mean To";
pub const SONG_2_DURATION: f64 = 218.93179;

// ============================================================================
// Activity Log
// ============================================================================

/// 2018-11-05T17:46:40Z, a Monday
pub const TS_1: i64 = 1541440000000;

/// 2018-11-05T17:50:00Z
pub const TS_2: i64 = 1541440200000;

/// 2018-11-11T02:33:56.796Z, a Sunday
pub const TS_3: i64 = 1541903636796;

pub const USER_1_ID: i64 = 15;
pub const USER_2_ID: i64 = 8;
