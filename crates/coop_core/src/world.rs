//! Entity/component store contract and an in-memory implementation.
//!
//! The sync systems only depend on [`SyncWorld`]: a capability query plus
//! typed access to the few fields they serialize. [`World`] is a small
//! HashMap-backed store with deterministic (sorted) iteration, used by the
//! headless host and the test harness.

use std::collections::HashMap;

use crate::components::{AgentState, Motion};
use crate::identity::EntityCategory;
use crate::inventory::{Inventory, ItemKind};
use crate::math::Pose;

/// Local entity handle owned by the world store.
pub type EntityId = u64;

/// Capabilities entities can be queried by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Has a pose.
    Pose,
    /// Has movement state.
    Motion,
    /// Is an autonomous agent.
    Agent,
    /// Has an inventory.
    Inventory,
    /// Is a world item.
    Item,
    /// Is controlled by a player (avatar or possessed agent).
    PlayerControlled,
}

/// What to create when spawning an entity.
#[derive(Debug, Clone, Default)]
pub struct SpawnDescriptor {
    /// Category, if the entity is network visible.
    pub category: Option<EntityCategory>,
    /// Initial pose.
    pub pose: Option<Pose>,
    /// Movement state.
    pub motion: Option<Motion>,
    /// Agent behavior state.
    pub agent: Option<AgentState>,
    /// Inventory with this many slots.
    pub inventory_slots: Option<usize>,
    /// Item kind for world items.
    pub item: Option<ItemKind>,
    /// Player-controlled flag.
    pub player_controlled: bool,
}

/// Query and component access surface the sync systems depend on.
pub trait SyncWorld {
    /// Create an entity and return its handle.
    fn spawn(&mut self, descriptor: &SpawnDescriptor) -> EntityId;

    /// Remove an entity. Returns false if it did not exist.
    fn despawn(&mut self, entity: EntityId) -> bool;

    /// Whether the entity exists and is active.
    fn is_active(&self, entity: EntityId) -> bool;

    /// Entities having every listed capability, in ascending handle order.
    fn entities_with(&self, capabilities: &[Capability]) -> Vec<EntityId>;

    /// Current pose.
    fn pose(&self, entity: EntityId) -> Option<Pose>;

    /// Overwrite the pose.
    fn set_pose(&mut self, entity: EntityId, pose: Pose);

    /// Movement state.
    fn motion(&self, entity: EntityId) -> Option<Motion>;

    /// Overwrite movement state.
    fn set_motion(&mut self, entity: EntityId, motion: Motion);

    /// Agent behavior state.
    fn agent_state(&self, entity: EntityId) -> Option<AgentState>;

    /// Overwrite agent behavior state.
    fn set_agent_state(&mut self, entity: EntityId, state: AgentState);

    /// Whether a player currently controls the entity.
    fn is_player_controlled(&self, entity: EntityId) -> bool;

    /// Inventory, if the entity has one.
    fn inventory(&self, entity: EntityId) -> Option<&Inventory>;

    /// Mutable inventory.
    fn inventory_mut(&mut self, entity: EntityId) -> Option<&mut Inventory>;

    /// Item kind for world items.
    fn item_kind(&self, entity: EntityId) -> Option<ItemKind>;
}

/// An entity with optional components.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Entity {
    /// Handle.
    pub id: EntityId,
    /// Network category, if any.
    pub category: Option<EntityCategory>,
    /// Inactive entities are ignored by queries and interaction checks.
    pub active: bool,
    /// Pose.
    pub pose: Option<Pose>,
    /// Movement state.
    pub motion: Option<Motion>,
    /// Agent behavior.
    pub agent: Option<AgentState>,
    /// Inventory.
    pub inventory: Option<Inventory>,
    /// Item kind for world items.
    pub item: Option<ItemKind>,
    /// Player-controlled flag.
    pub player_controlled: bool,
}

impl Entity {
    fn has(&self, capability: Capability) -> bool {
        match capability {
            Capability::Pose => self.pose.is_some(),
            Capability::Motion => self.motion.is_some(),
            Capability::Agent => self.agent.is_some(),
            Capability::Inventory => self.inventory.is_some(),
            Capability::Item => self.item.is_some(),
            Capability::PlayerControlled => self.player_controlled,
        }
    }
}

/// In-memory entity store.
///
/// Uses a `HashMap` for O(1) lookup with sorted iteration for queries.
#[derive(Debug, Clone)]
pub struct World {
    entities: HashMap<EntityId, Entity>,
    next_id: EntityId,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// Create an empty world.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entities: HashMap::new(),
            next_id: 1,
        }
    }

    /// Get an entity.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Get an entity mutably.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    /// Number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the world is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Sorted entity ids for deterministic iteration.
    #[must_use]
    pub fn sorted_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<_> = self.entities.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Activate or deactivate an entity.
    pub fn set_active(&mut self, id: EntityId, active: bool) {
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.active = active;
        }
    }

    /// Remove every entity.
    pub fn clear(&mut self) {
        self.entities.clear();
    }
}

impl SyncWorld for World {
    fn spawn(&mut self, descriptor: &SpawnDescriptor) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;
        self.entities.insert(
            id,
            Entity {
                id,
                category: descriptor.category,
                active: true,
                pose: descriptor.pose,
                motion: descriptor.motion,
                agent: descriptor.agent,
                inventory: descriptor.inventory_slots.map(Inventory::new),
                item: descriptor.item,
                player_controlled: descriptor.player_controlled,
            },
        );
        id
    }

    fn despawn(&mut self, entity: EntityId) -> bool {
        self.entities.remove(&entity).is_some()
    }

    fn is_active(&self, entity: EntityId) -> bool {
        self.entities.get(&entity).is_some_and(|e| e.active)
    }

    fn entities_with(&self, capabilities: &[Capability]) -> Vec<EntityId> {
        let mut ids: Vec<_> = self
            .entities
            .values()
            .filter(|e| e.active && capabilities.iter().all(|&c| e.has(c)))
            .map(|e| e.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    fn pose(&self, entity: EntityId) -> Option<Pose> {
        self.entities.get(&entity).and_then(|e| e.pose)
    }

    fn set_pose(&mut self, entity: EntityId, pose: Pose) {
        if let Some(e) = self.entities.get_mut(&entity) {
            e.pose = Some(pose);
        }
    }

    fn motion(&self, entity: EntityId) -> Option<Motion> {
        self.entities.get(&entity).and_then(|e| e.motion)
    }

    fn set_motion(&mut self, entity: EntityId, motion: Motion) {
        if let Some(e) = self.entities.get_mut(&entity) {
            e.motion = Some(motion);
        }
    }

    fn agent_state(&self, entity: EntityId) -> Option<AgentState> {
        self.entities.get(&entity).and_then(|e| e.agent)
    }

    fn set_agent_state(&mut self, entity: EntityId, state: AgentState) {
        if let Some(e) = self.entities.get_mut(&entity) {
            e.agent = Some(state);
        }
    }

    fn is_player_controlled(&self, entity: EntityId) -> bool {
        self.entities
            .get(&entity)
            .is_some_and(|e| e.player_controlled)
    }

    fn inventory(&self, entity: EntityId) -> Option<&Inventory> {
        self.entities.get(&entity).and_then(|e| e.inventory.as_ref())
    }

    fn inventory_mut(&mut self, entity: EntityId) -> Option<&mut Inventory> {
        self.entities
            .get_mut(&entity)
            .and_then(|e| e.inventory.as_mut())
    }

    fn item_kind(&self, entity: EntityId) -> Option<ItemKind> {
        self.entities.get(&entity).and_then(|e| e.item)
    }
}
