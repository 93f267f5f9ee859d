use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{MealSlot, PlannedMeal};
use crate::range::DateRange;

#[derive(Debug, Clone, Serialize)]
pub struct GridCell {
    pub slot: MealSlot,
    pub meal: Option<PlannedMeal>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GridDay {
    pub date: NaiveDate,
    pub cells: Vec<GridCell>,
}

impl GridDay {
    #[must_use]
    pub fn cell(&self, slot: MealSlot) -> Option<&PlannedMeal> {
        self.cells
            .iter()
            .find(|c| c.slot == slot)
            .and_then(|c| c.meal.as_ref())
    }
}

/// Longest range a grid is built for: a leap year.
pub const MAX_GRID_DAYS: u64 = 366;

/// Lay meals out as one row per date with a cell for every slot. Meals
/// outside `range` are ignored.
#[must_use]
pub fn build_grid(range: DateRange, meals: &[PlannedMeal]) -> Vec<GridDay> {
    range
        .days()
        .map(|date| GridDay {
            date,
            cells: MealSlot::ALL
                .into_iter()
                .map(|slot| GridCell {
                    slot,
                    meal: meals
                        .iter()
                        .find(|m| m.entry.date == date && m.entry.slot == slot)
                        .cloned(),
                })
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MealPlanEntry;
    use crate::range::ViewMode;

    fn meal(day: u32, slot: MealSlot, title: &str) -> PlannedMeal {
        PlannedMeal {
            entry: MealPlanEntry {
                id: i64::from(day),
                uuid: String::new(),
                owner_id: 1,
                date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
                slot,
                recipe_id: 1,
                notes: None,
                created_at: String::new(),
                updated_at: String::new(),
            },
            recipe_title: Some(title.into()),
        }
    }

    #[test]
    fn test_week_grid() {
        let range =
            DateRange::resolve(NaiveDate::from_ymd_opt(2024, 3, 6).unwrap(), ViewMode::Week).unwrap();
        let meals = vec![
            meal(3, MealSlot::Dinner, "Chili"),
            meal(9, MealSlot::Breakfast, "Waffles"),
            meal(12, MealSlot::Lunch, "Outside"),
        ];
        let grid = build_grid(range, &meals);

        assert_eq!(grid.len(), 7);
        assert!(grid.iter().all(|d| d.cells.len() == 5));
        assert_eq!(grid[0].date, range.start);
        assert_eq!(
            grid[0].cell(MealSlot::Dinner).unwrap().recipe_title.as_deref(),
            Some("Chili")
        );
        assert!(grid[0].cell(MealSlot::Lunch).is_none());
        assert!(grid[6].cell(MealSlot::Breakfast).is_some());

        let slots: Vec<MealSlot> = grid[1].cells.iter().map(|c| c.slot).collect();
        assert_eq!(slots, MealSlot::ALL.to_vec());

        let placed = grid
            .iter()
            .flat_map(|d| d.cells.iter())
            .filter(|c| c.meal.is_some())
            .count();
        assert_eq!(placed, 2);
    }
}
