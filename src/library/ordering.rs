use std::{fmt, str::FromStr};

/// Where a moved track lands relative to the track it is moved onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoveMode {
    #[default]
    Before,
    After,
}

impl MoveMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Before => "before",
            Self::After => "after",
        }
    }
}

impl fmt::Display for MoveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MoveMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "before" => Ok(Self::Before),
            "after" => Ok(Self::After),
            other => Err(format!("unknown move mode '{other}'")),
        }
    }
}

/// Moves `items[from]` next to `items[to]` (both 0-based, in bounds).
///
/// The moved item is taken out first, the target is located in what is left,
/// and the item goes in front of it or behind it. The result is the same
/// whether the item travels up or down the list.
pub fn reorder<T>(items: &mut Vec<T>, from: usize, to: usize, mode: MoveMode) {
    if from == to || from >= items.len() || to >= items.len() {
        return;
    }
    let moved = items.remove(from);
    let target = if to > from { to - 1 } else { to };
    let at = match mode {
        MoveMode::Before => target,
        MoveMode::After => target + 1,
    }
    .min(items.len());
    items.insert(at, moved);
}
