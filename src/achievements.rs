//! Fixed achievement catalog. Unlock rules live on the server; the client
//! only needs names and icons to announce an unlock.

pub struct Achievement {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
}

impl Achievement {
    const fn new(
        id: &'static str,
        name: &'static str,
        description: &'static str,
        icon: &'static str,
    ) -> Self {
        Achievement {
            id,
            name,
            description,
            icon,
        }
    }
}

pub const CATALOG: [Achievement; 12] = [
    Achievement::new("firstQuest", "First Steps", "Complete your first quest", "🏅"),
    Achievement::new("fiveQuests", "Traveller", "Complete 5 quests", "⚔"),
    Achievement::new("tenQuests", "Veteran", "Complete 10 quests", "🛡"),
    Achievement::new("twentyFiveQuests", "Hero", "Complete 25 quests", "🦁"),
    Achievement::new("fiftyQuests", "Legend", "Complete 50 quests", "👑"),
    Achievement::new("combo3", "Combo Starter", "Reach a x3 combo", "🔥"),
    Achievement::new("combo5", "On Fire!", "Reach a x5 combo", "⚡"),
    Achievement::new("combo10", "Unstoppable", "Reach a x10 combo", "🌟"),
    Achievement::new("level5", "Rising Star", "Reach level 5", "⭐"),
    Achievement::new("level10", "Master", "Reach level 10", "💎"),
    Achievement::new("streak7", "Week Warrior", "Keep a 7 day streak", "💪"),
    Achievement::new("streak30", "Month Master", "Keep a 30 day streak", "🏆"),
];

pub fn find(id: &str) -> Option<&'static Achievement> {
    CATALOG.iter().find(|achievement| achievement.id == id)
}

/// `icon name` for a known id, or the raw id for one the catalog lacks.
pub fn label(id: &str) -> String {
    match find(id) {
        Some(achievement) => format!("{} {}", achievement.icon, achievement.name),
        None => id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn catalog_ids_are_unique() {
        let ids: HashSet<_> = CATALOG.iter().map(|a| a.id).collect();
        assert_eq!(ids.len(), CATALOG.len());
    }

    #[test]
    fn unknown_ids_fall_back_to_raw_label() {
        assert_eq!(label("fiveQuests"), "⚔ Traveller");
        assert_eq!(label("seasonal2026"), "seasonal2026");
    }
}
