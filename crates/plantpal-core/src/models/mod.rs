//! Data models for PlantPal backend resources.
//!
//! - `Plant`, `PlantAilment`: herbal reference entries managed by admins
//! - `Profile`: end-user profile with optional premium details
//! - `TermsVersion`: versioned terms and conditions text
//! - `UserAccount`, `Feedback`: admin dashboard listings
//! - `AdminProfileUpdate`: request body for editing the signed-in admin

pub mod plant;
pub mod profile;
pub mod terms;
pub mod user;

pub use plant::{Plant, PlantAilment};
pub use profile::{AdminProfileUpdate, Profile, ProfileDetails};
pub use terms::TermsVersion;
pub use user::{Feedback, UserAccount};
