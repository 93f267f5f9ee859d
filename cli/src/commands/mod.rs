mod grocery;
mod helpers;
mod plan;
mod recipe;

pub(crate) use grocery::{cmd_export_ical, cmd_grocery, cmd_ical_preview};
pub(crate) use helpers::{RangeSelection, resolve_range};
pub(crate) use plan::{
    cmd_plan_apply, cmd_plan_grid, cmd_plan_list, cmd_plan_remove, cmd_plan_reassign,
    cmd_plan_schedule,
};
pub(crate) use recipe::{cmd_recipe_import, cmd_recipe_list, cmd_recipe_show};
