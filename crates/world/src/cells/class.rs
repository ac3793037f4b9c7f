use thiserror::Error;

use crate::content::ObjectCategory;

use super::container::ContainerStore;
use super::object::LiveCellRef;

#[derive(Debug, Error)]
pub enum ClassError {
    #[error("object '{id}' of category {category} has no container store")]
    NoContainerStore { category: ObjectCategory, id: String },
}

/// Per-category behaviour the cell store defers to while filling loaded cells.
pub trait ObjectClasses {
    fn container_store<'a>(
        &self,
        object: &'a mut LiveCellRef,
    ) -> Result<&'a mut ContainerStore, ClassError>;
}

/// Containers, creatures and npcs carry an inventory, created on first access.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardClasses;

impl ObjectClasses for StandardClasses {
    fn container_store<'a>(
        &self,
        object: &'a mut LiveCellRef,
    ) -> Result<&'a mut ContainerStore, ClassError> {
        let category = object.base.category;
        if !category.has_inventory() {
            return Err(ClassError::NoContainerStore {
                category,
                id: object.base.id.clone(),
            });
        }
        Ok(object.data.inventory_or_default())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::content::{CellRef, ObjectDef};

    fn live(id: &str, category: ObjectCategory) -> LiveCellRef {
        let base = Arc::new(ObjectDef {
            id: id.to_string(),
            category,
            label: id.to_string(),
            inventory: Vec::new(),
        });
        LiveCellRef::new(base, CellRef::new(id, 1))
    }

    #[test]
    fn inventory_categories_get_a_lazily_created_store() {
        let mut chest = live("chest_small", ObjectCategory::Container);
        assert!(chest.data.inventory().is_none());

        StandardClasses
            .container_store(&mut chest)
            .expect("store")
            .add("gold_001", 3);
        StandardClasses
            .container_store(&mut chest)
            .expect("store")
            .add("gold_001", 2);
        assert_eq!(
            chest.data.inventory().map(|store| store.count_of("gold_001")),
            Some(5)
        );
    }

    #[test]
    fn plain_items_have_no_store() {
        let mut sword = live("sword", ObjectCategory::Weapon);
        let err = StandardClasses
            .container_store(&mut sword)
            .expect_err("no store");
        assert!(matches!(
            err,
            ClassError::NoContainerStore {
                category: ObjectCategory::Weapon,
                ..
            }
        ));
    }
}
