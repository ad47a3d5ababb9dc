//! Pure reorder operations for itinerary days and activities.
//!
//! These functions run synchronously on owned collections and perform no
//! I/O; persisting the results (and keeping the two collections of a
//! cross-day move consistent) is the caller's job.

use thiserror::Error;

use crate::models::day::{Activity, ItineraryDay};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReorderError {
    #[error("index {index} out of bounds for list of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },
}

fn check_index(index: usize, len: usize) -> Result<(), ReorderError> {
    if index < len {
        Ok(())
    } else {
        Err(ReorderError::IndexOutOfBounds { index, len })
    }
}

/// Moves the day at `source_index` to `dest_index` and rewrites every
/// day's `order` field to its new zero-based position.
///
/// Out-of-range indices are contract violations and return an error
/// instead of clamping.
pub fn move_day(
    mut days: Vec<ItineraryDay>,
    source_index: usize,
    dest_index: usize,
) -> Result<Vec<ItineraryDay>, ReorderError> {
    check_index(source_index, days.len())?;
    check_index(dest_index, days.len())?;

    let day = days.remove(source_index);
    days.insert(dest_index, day);
    for (position, day) in days.iter_mut().enumerate() {
        day.order = position as i64;
    }
    Ok(days)
}

/// Moves one activity, either within a single day or from one day's list
/// into another's. Activities carry no order field; position in the
/// returned vectors is the order.
///
/// With `same_day` set, `dest_activities` is passed through untouched and
/// both indices must address `source_activities`. Otherwise the element
/// leaves the source list and is inserted into the destination list,
/// where `dest_index == dest_activities.len()` appends.
pub fn move_activity(
    mut source_activities: Vec<Activity>,
    mut dest_activities: Vec<Activity>,
    source_index: usize,
    dest_index: usize,
    same_day: bool,
) -> Result<(Vec<Activity>, Vec<Activity>), ReorderError> {
    check_index(source_index, source_activities.len())?;

    if same_day {
        check_index(dest_index, source_activities.len())?;
        let activity = source_activities.remove(source_index);
        source_activities.insert(dest_index, activity);
    } else {
        if dest_index > dest_activities.len() {
            return Err(ReorderError::IndexOutOfBounds {
                index: dest_index,
                len: dest_activities.len(),
            });
        }
        let activity = source_activities.remove(source_index);
        dest_activities.insert(dest_index, activity);
    }

    Ok((source_activities, dest_activities))
}
