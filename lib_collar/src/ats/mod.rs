//! # ATS Web-Portal Source
//!
//! The ATS portal has no API. Data is exported by logging in with a form,
//! pressing an export control and downloading the file it produces.
//!
//! Everything that depends on the portal's markup (page paths, field names,
//! control ids) comes from [`AtsConfig`](crate::configs::AtsConfig). The
//! session state machine in [`session`] only knows opaque action ids.

pub mod forms;
pub mod session;

pub use forms::{parse_forms, PortalForm};
pub use session::{fetch_export, with_session, AtsCredentials, SessionPhase, SourceSession};
