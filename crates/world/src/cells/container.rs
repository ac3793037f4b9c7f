use tracing::warn;

use crate::content::{InventoryEntry, WorldDatabase};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemStack {
    pub item_id: String,
    pub count: u32,
}

/// Inventory of a container, creature or npc instance. Stacks keep first-insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerStore {
    stacks: Vec<ItemStack>,
}

impl ContainerStore {
    /// Adds authored inventory entries. Ids with no object def are skipped.
    pub fn fill(&mut self, entries: &[InventoryEntry], database: &WorldDatabase) {
        for entry in entries {
            if database.object_def(&entry.item).is_none() {
                warn!(item = %entry.item, "container_fill_unknown_item");
                continue;
            }
            self.add(&entry.item, entry.count);
        }
    }

    pub fn add(&mut self, item_id: &str, count: u32) {
        match self.stacks.iter_mut().find(|stack| stack.item_id == item_id) {
            Some(stack) => stack.count = stack.count.saturating_add(count),
            None => self.stacks.push(ItemStack {
                item_id: item_id.to_string(),
                count,
            }),
        }
    }

    pub fn count_of(&self, item_id: &str) -> u32 {
        self.stacks
            .iter()
            .find(|stack| stack.item_id == item_id)
            .map_or(0, |stack| stack.count)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ItemStack> {
        self.stacks.iter()
    }

    pub fn len(&self) -> usize {
        self.stacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }
}
