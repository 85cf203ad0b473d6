//! Level curve: the mapping between accumulated XP and a user's level.
//!
//! Level `L` (for `L >= 2`) is reached at `100 * L^2` XP. Level 1 is the
//! floor and covers everything below the level-2 threshold, so a fresh
//! account with zero XP sits at level 1.
//!
//! Both directions are pure integer arithmetic; no floating point is
//! involved so the curve is exact for the whole `i64` XP range we store.

use serde::Serialize;

/// XP multiplier applied to the squared level.
pub const XP_PER_LEVEL_UNIT: i64 = 100;

/// The lowest level a user can hold.
pub const MIN_LEVEL: i32 = 1;

/// XP at which `level` is reached (`100 * level^2`).
///
/// Levels below [`MIN_LEVEL`] are clamped to it.
pub fn xp_for_level(level: i32) -> i64 {
    let level = i64::from(level.max(MIN_LEVEL));
    XP_PER_LEVEL_UNIT.saturating_mul(level.saturating_mul(level))
}

/// Level held with `xp` experience points: `max(1, floor(sqrt(xp / 100)))`.
///
/// Negative input is treated as zero. The awarder never produces negative XP.
pub fn level_for(xp: i64) -> i32 {
    let units = xp.max(0) / XP_PER_LEVEL_UNIT;
    let level = integer_sqrt(units).max(i64::from(MIN_LEVEL));
    i32::try_from(level).unwrap_or(i32::MAX)
}

/// Floor of the square root of a non-negative integer.
fn integer_sqrt(n: i64) -> i64 {
    if n < 2 {
        return n.max(0);
    }
    // Seed from f64 and correct the rounding at the edges.
    let mut root = (n as f64).sqrt() as i64;
    while root.saturating_mul(root) > n {
        root -= 1;
    }
    while (root + 1).saturating_mul(root + 1) <= n {
        root += 1;
    }
    root
}

/// Where a user sits on the curve, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LevelProgress {
    pub level: i32,
    pub xp: i64,
    /// XP at which the current level started (0 for level 1).
    pub level_floor_xp: i64,
    /// XP at which the next level is reached.
    pub next_level_xp: i64,
    pub xp_to_next_level: i64,
    /// Percentage through the current level, 0-100.
    pub percent: u8,
}

/// Compute the display progress for a given XP total.
pub fn level_progress(xp: i64) -> LevelProgress {
    let xp = xp.max(0);
    let level = level_for(xp);
    let level_floor_xp = if level == MIN_LEVEL {
        0
    } else {
        xp_for_level(level)
    };
    let next_level_xp = xp_for_level(level.saturating_add(1));
    let span = (next_level_xp - level_floor_xp).max(1);
    let into_level = xp - level_floor_xp;
    let percent = ((into_level * 100) / span).clamp(0, 100) as u8;

    LevelProgress {
        level,
        xp,
        level_floor_xp,
        next_level_xp,
        xp_to_next_level: (next_level_xp - xp).max(0),
        percent,
    }
}
