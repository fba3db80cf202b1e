//! # murmur-dm
//!
//! Direct messaging over a mix network: dual-send of partner and
//! self-addressed copies, the receive pipeline, durable send tracking and
//! the push-notification filter.

pub mod client;
pub mod config;
pub mod error;
pub mod event_model;
pub mod nickname;
pub mod notifications;
pub mod partners;
pub mod receiver;
pub mod send_tracker;

pub use client::{ClientCallbacks, DmClient, SendReport};
pub use config::DmConfig;
pub use error::DmError;
pub use event_model::{EventModel, MessageInfo, StatusUpdate};
pub use notifications::{
    make_notification_fp, notification_reports_for_me, NotificationFilter, NotificationLevel,
    NotificationRecord, NotificationReport, NotificationState, NotificationUpdate,
};
pub use partners::{BackupTrigger, Partner, PartnerStatus};
pub use send_tracker::SendTracker;
