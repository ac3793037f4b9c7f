use std::fmt;

/// Object categories a cell keeps a separate reference list for.
///
/// Declaration order is the resolver's scan order; `index()` relies on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectCategory {
    Activator,
    Potion,
    Apparatus,
    Armor,
    Book,
    Clothing,
    Container,
    Creature,
    Door,
    Ingredient,
    CreatureLevList,
    ItemLevList,
    Light,
    Lockpick,
    Miscellaneous,
    Npc,
    Probe,
    Repair,
    Static,
    Weapon,
}

impl ObjectCategory {
    pub const COUNT: usize = 20;

    pub const SCAN_ORDER: [ObjectCategory; Self::COUNT] = [
        Self::Activator,
        Self::Potion,
        Self::Apparatus,
        Self::Armor,
        Self::Book,
        Self::Clothing,
        Self::Container,
        Self::Creature,
        Self::Door,
        Self::Ingredient,
        Self::CreatureLevList,
        Self::ItemLevList,
        Self::Light,
        Self::Lockpick,
        Self::Miscellaneous,
        Self::Npc,
        Self::Probe,
        Self::Repair,
        Self::Static,
        Self::Weapon,
    ];

    /// Categories whose instances carry an inventory filled after a cell loads.
    pub const WITH_INVENTORY: [ObjectCategory; 3] = [Self::Container, Self::Creature, Self::Npc];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::SCAN_ORDER.get(index).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Activator => "Activator",
            Self::Potion => "Potion",
            Self::Apparatus => "Apparatus",
            Self::Armor => "Armor",
            Self::Book => "Book",
            Self::Clothing => "Clothing",
            Self::Container => "Container",
            Self::Creature => "Creature",
            Self::Door => "Door",
            Self::Ingredient => "Ingredient",
            Self::CreatureLevList => "CreatureLevList",
            Self::ItemLevList => "ItemLevList",
            Self::Light => "Light",
            Self::Lockpick => "Lockpick",
            Self::Miscellaneous => "Miscellaneous",
            Self::Npc => "Npc",
            Self::Probe => "Probe",
            Self::Repair => "Repair",
            Self::Static => "Static",
            Self::Weapon => "Weapon",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::SCAN_ORDER
            .into_iter()
            .find(|category| category.name() == name)
    }

    pub fn has_inventory(self) -> bool {
        Self::WITH_INVENTORY.contains(&self)
    }
}

impl fmt::Display for ObjectCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_order_matches_declaration_order() {
        for (position, category) in ObjectCategory::SCAN_ORDER.iter().enumerate() {
            assert_eq!(category.index(), position, "category={category}");
            assert_eq!(ObjectCategory::from_index(position), Some(*category));
        }
        assert_eq!(ObjectCategory::from_index(ObjectCategory::COUNT), None);
    }

    #[test]
    fn names_roundtrip_and_are_case_sensitive() {
        for category in ObjectCategory::SCAN_ORDER {
            assert_eq!(ObjectCategory::from_name(category.name()), Some(category));
        }
        assert_eq!(ObjectCategory::from_name("npc"), None);
        assert_eq!(ObjectCategory::from_name("Furniture"), None);
    }

    #[test]
    fn only_containers_creatures_and_npcs_carry_inventory() {
        let carriers = ObjectCategory::SCAN_ORDER
            .into_iter()
            .filter(|category| category.has_inventory())
            .collect::<Vec<_>>();
        assert_eq!(
            carriers,
            vec![
                ObjectCategory::Container,
                ObjectCategory::Creature,
                ObjectCategory::Npc
            ]
        );
    }
}
