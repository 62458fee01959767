//! Convergence checks for replicated state.
//!
//! Every peer should agree on which network entities exist, who owns them,
//! what each inventory holds and where static entities sit. Poses of moving
//! entities are excluded since clients render them through interpolation.
//!
//! Agreement is checked by hashing that state per peer in network id order
//! and comparing the hashes.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use coop_core::identity::EntityCategory;
use coop_core::session::NetSession;
use coop_core::world::World;

use crate::harness::Harness;

/// Hash the replicated state one peer holds.
#[must_use]
pub fn fingerprint(session: &NetSession, world: &World) -> u64 {
    let mut hasher = DefaultHasher::new();

    for identity in session.identities().sorted() {
        identity.network_id.hash(&mut hasher);
        identity.category.hash(&mut hasher);
        identity.owner.hash(&mut hasher);

        let Some(entity) = world.get(identity.local) else {
            // Identity without a world entity: hash a marker so it differs.
            u8::MAX.hash(&mut hasher);
            continue;
        };
        entity.inventory.hash(&mut hasher);
        entity.item.hash(&mut hasher);
        if matches!(
            identity.category,
            EntityCategory::Item | EntityCategory::Container
        ) {
            if let Some(pose) = entity.pose {
                pose.position.x.to_bits().hash(&mut hasher);
                pose.position.y.to_bits().hash(&mut hasher);
            }
        }
    }

    hasher.finish()
}

/// Fingerprints of every peer in a harness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvergenceResult {
    /// Host fingerprint.
    pub host: u64,
    /// Client fingerprints in connection order.
    pub clients: Vec<u64>,
}

impl ConvergenceResult {
    /// Whether every client matches the host.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.clients.iter().all(|&hash| hash == self.host)
    }

    /// Assert that every client matches the host, with a detailed message.
    ///
    /// # Panics
    ///
    /// Panics if any client fingerprint differs from the host's.
    pub fn assert_converged(&self) {
        if !self.is_converged() {
            let diverged: Vec<usize> = self
                .clients
                .iter()
                .enumerate()
                .filter(|(_, &hash)| hash != self.host)
                .map(|(index, _)| index)
                .collect();
            panic!(
                "Replicated state diverged!\n\
                 Host hash: {}\n\
                 Client hashes: {:?}\n\
                 Diverged clients: {:?}",
                self.host, self.clients, diverged
            );
        }
    }
}

/// Fingerprint every connected peer in a harness.
#[must_use]
pub fn check_convergence(net: &Harness) -> ConvergenceResult {
    ConvergenceResult {
        host: fingerprint(&net.host.session, &net.host.world),
        clients: net
            .clients()
            .iter()
            .filter(|client| client.transport.is_connected())
            .map(|client| fingerprint(&client.session, &client.world))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_sessions_match() {
        let net = Harness::new();
        let result = check_convergence(&net);
        assert!(result.is_converged());
        assert!(result.clients.is_empty());
    }

    #[test]
    #[should_panic(expected = "diverged")]
    fn test_assert_reports_divergence() {
        ConvergenceResult {
            host: 1,
            clients: vec![1, 2],
        }
        .assert_converged();
    }
}
