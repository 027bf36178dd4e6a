//! Owner-scoped entities and their field sets.
//!
//! Each entity is a `sqlx::FromRow` row type implementing
//! [`Record`](crate::record::Record), paired with an all-optional `*Fields`
//! struct used as a create input, a filter, an update patch and a delete
//! selector.

mod schedule;
mod unavailability_link;
mod volunteer;
mod volunteer_link;
mod weekday_link;

pub use schedule::{Schedule, ScheduleFields};
pub use unavailability_link::{UnavailabilityLink, UnavailabilityLinkFields};
pub use volunteer::{Volunteer, VolunteerFields};
pub use volunteer_link::{VolunteerLink, VolunteerLinkFields};
pub use weekday_link::{WeekdayLink, WeekdayLinkFields};
