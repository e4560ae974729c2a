//! Basic damage dice for thrust and swing attacks, driven by striking ST.

use serde::{Serialize, Serializer};
use std::fmt;

/// `count`d6 plus a flat modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dice {
    pub count: i32,
    pub modifier: i32,
}

impl Dice {
    #[must_use]
    pub const fn new(count: i32, modifier: i32) -> Self {
        Self { count, modifier }
    }

    #[must_use]
    pub const fn plus(self, modifier: i32) -> Self {
        Self {
            count: self.count,
            modifier: self.modifier + modifier,
        }
    }
}

impl fmt::Display for Dice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d", self.count)?;
        match self.modifier {
            0 => Ok(()),
            m if m > 0 => write!(f, "+{m}"),
            m => write!(f, "{m}"),
        }
    }
}

impl Serialize for Dice {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Thrust damage for a strength level.
#[must_use]
pub fn thrust_for(strength: i32) -> Dice {
    let st = strength.max(1);
    if st < 19 {
        return Dice::new(1, -(6 - (st - 1) / 2));
    }
    let mut value = st - 11;
    if st > 50 {
        value -= 1;
        if st > 79 {
            value -= 1 + (st - 80) / 5;
        }
    }
    Dice::new(value / 8 + 1, value % 8 / 2 - 1)
}

/// Swing damage for a strength level.
#[must_use]
pub fn swing_for(strength: i32) -> Dice {
    let st = strength.max(1);
    if st < 10 {
        return Dice::new(1, -(5 - (st - 1) / 2));
    }
    if st < 28 {
        let value = st - 9;
        return Dice::new(value / 4 + 1, value % 4 - 1);
    }
    let mut value = st;
    if st > 40 {
        value -= (st - 40) / 5;
    }
    if st > 59 {
        value += 1;
    }
    value += 9;
    Dice::new(value / 8 + 1, value % 8 / 2 - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_table_rows() {
        assert_eq!(thrust_for(10).to_string(), "1d-2");
        assert_eq!(swing_for(10).to_string(), "1d");
        assert_eq!(thrust_for(12).to_string(), "1d-1");
        assert_eq!(swing_for(12).to_string(), "1d+2");
        assert_eq!(thrust_for(14).to_string(), "1d");
        assert_eq!(swing_for(14).to_string(), "2d");
        assert_eq!(thrust_for(20).to_string(), "2d-1");
        assert_eq!(swing_for(20).to_string(), "3d+2");
        assert_eq!(swing_for(28).to_string(), "5d+1");
    }

    #[test]
    fn weak_characters_floor_at_one() {
        assert_eq!(thrust_for(0), thrust_for(1));
        assert_eq!(thrust_for(1).to_string(), "1d-6");
        assert_eq!(swing_for(1).to_string(), "1d-5");
    }

    #[test]
    fn plus_adjusts_modifier() {
        assert_eq!(swing_for(10).plus(2).to_string(), "1d+2");
    }
}
