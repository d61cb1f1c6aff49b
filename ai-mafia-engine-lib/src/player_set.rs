//! Dense set of player ids, indexed by slot.

use ai_mafia_lib::PlayerId;
use bit_set::BitSet;

/// Set of [`PlayerId`]s backed by a bit set over slot indices.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct PlayerSet(BitSet);

impl PlayerSet {
    pub fn new() -> Self {
        Self(BitSet::new())
    }

    pub fn insert(&mut self, id: PlayerId) -> bool {
        self.0.insert(id.index())
    }

    pub fn remove(&mut self, id: PlayerId) -> bool {
        self.0.remove(id.index())
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.0.contains(id.index())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Removes every member of `other` from this set.
    pub fn difference_with(&mut self, other: &PlayerSet) {
        self.0.difference_with(&other.0);
    }

    pub fn iter(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.0.iter().map(PlayerId)
    }
}

impl FromIterator<PlayerId> for PlayerSet {
    fn from_iter<T: IntoIterator<Item = PlayerId>>(iter: T) -> Self {
        let mut set = PlayerSet::new();
        for id in iter {
            set.insert(id);
        }
        set
    }
}

impl Extend<PlayerId> for PlayerSet {
    fn extend<T: IntoIterator<Item = PlayerId>>(&mut self, iter: T) {
        for id in iter {
            self.insert(id);
        }
    }
}
