// 1.2: fixed-capacity authority set. privileged ops beyond the single admin go
// through this allow-list. bounded so state size stays constant.

use crate::types::Identity;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_AUTHORITIES: usize = 10;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthorityError {
    #[error("Maximum number of authorities reached")]
    MaxAuthoritiesReached,

    #[error("Authority not found")]
    AuthorityNotFound,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthoritySet {
    members: Vec<Identity>,
}

impl AuthoritySet {
    pub fn new() -> Self {
        Self { members: Vec::new() }
    }

    pub fn contains(&self, id: Identity) -> bool {
        self.members.iter().any(|m| *m == id)
    }

    /// Idempotent: adding an existing member is a no-op.
    pub fn add(&mut self, id: Identity) -> Result<(), AuthorityError> {
        if self.contains(id) {
            return Ok(());
        }
        if self.members.len() >= MAX_AUTHORITIES {
            return Err(AuthorityError::MaxAuthoritiesReached);
        }
        self.members.push(id);
        Ok(())
    }

    pub fn remove(&mut self, id: Identity) -> Result<(), AuthorityError> {
        let pos = self
            .members
            .iter()
            .position(|m| *m == id)
            .ok_or(AuthorityError::AuthorityNotFound)?;
        self.members.swap_remove(pos);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_idempotent() {
        let mut set = AuthoritySet::new();
        set.add(Identity(7)).unwrap();
        set.add(Identity(7)).unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.contains(Identity(7)));
    }

    #[test]
    fn capacity_is_enforced() {
        let mut set = AuthoritySet::new();
        for i in 0..MAX_AUTHORITIES as u64 {
            set.add(Identity(i)).unwrap();
        }
        assert_eq!(
            set.add(Identity(999)),
            Err(AuthorityError::MaxAuthoritiesReached)
        );
    }

    #[test]
    fn remove_unknown_fails() {
        let mut set = AuthoritySet::new();
        set.add(Identity(1)).unwrap();
        assert_eq!(set.remove(Identity(2)), Err(AuthorityError::AuthorityNotFound));
        set.remove(Identity(1)).unwrap();
        assert!(set.is_empty());
    }
}
