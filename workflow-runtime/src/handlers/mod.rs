//! Notification handlers shipped with the runtime.

mod schedule_background_activities;

pub use schedule_background_activities::ScheduleBackgroundActivities;
