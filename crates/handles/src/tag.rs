//! Owner tags.

use std::fmt;
use std::hash::{Hash, Hasher};

use xxhash_rust::xxh3::xxh3_64;

/// Category of object sharing the handle table.
///
/// The tag is a secondary key checked on every lookup so that a cookie
/// minted for one kind of object never resolves to another kind. It is not
/// a security control. Two tags are equal when their names hash equal.
#[derive(Copy, Clone, Debug)]
pub struct OwnerTag {
    id: u64,
    name: &'static str,
}

impl OwnerTag {
    pub fn new(name: &'static str) -> Self {
        Self {
            id: xxh3_64(name.as_bytes()),
            name,
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for OwnerTag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for OwnerTag {}

impl Hash for OwnerTag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for OwnerTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
