//! Caller identity and master models
//!
//! Identity is owned by the external auth service; tokens reach this core
//! already validated, carrying a subject id and a role.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;
use uuid::Uuid;

/// User role enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Registered client
    Client,
    /// Service provider who publishes slots
    Master,
    /// Salon administrator acting for the salon's masters
    SalonAdmin,
    /// Unregistered requester
    #[default]
    Guest,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Client => write!(f, "client"),
            UserRole::Master => write!(f, "master"),
            UserRole::SalonAdmin => write!(f, "salon_admin"),
            UserRole::Guest => write!(f, "guest"),
        }
    }
}

impl UserRole {
    /// Parse a token role claim; unknown roles are guests
    pub fn from_claim(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "client" => UserRole::Client,
            "master" => UserRole::Master,
            "salon_admin" => UserRole::SalonAdmin,
            _ => UserRole::Guest,
        }
    }
}

/// Authenticated caller of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    /// Subject id from the token
    pub id: Uuid,

    /// Role from the token
    pub role: UserRole,
}

impl Caller {
    pub fn new(id: Uuid, role: UserRole) -> Self {
        Self { id, role }
    }

    pub fn client(id: Uuid) -> Self {
        Self::new(id, UserRole::Client)
    }

    pub fn master(id: Uuid) -> Self {
        Self::new(id, UserRole::Master)
    }

    pub fn guest(id: Uuid) -> Self {
        Self::new(id, UserRole::Guest)
    }

    /// Only the `client` role counts as a registered client
    pub fn is_registered_client(&self) -> bool {
        self.role == UserRole::Client
    }
}

/// Per-master confirmation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ConfirmationPolicy {
    /// Bookings need an explicit confirm step
    pub require_confirmation: bool,

    /// The confirm step applies to registered clients too
    pub confirmation_for_all: bool,
}

impl ConfirmationPolicy {
    pub fn new(require_confirmation: bool, confirmation_for_all: bool) -> Self {
        Self {
            require_confirmation,
            confirmation_for_all,
        }
    }

    /// Parse the stored `rules_json` document.
    ///
    /// Missing document, missing fields or a malformed document all fall
    /// back to the defaults (both flags false).
    pub fn from_rules_json(rules: Option<&serde_json::Value>) -> Self {
        match rules {
            None | Some(serde_json::Value::Null) => Self::default(),
            Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|e| {
                warn!("Ignoring malformed confirmation rules {}: {}", value, e);
                Self::default()
            }),
        }
    }
}

/// Master entity as seen by the booking core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Master {
    /// User id
    pub id: Uuid,

    /// Display name
    pub full_name: Option<String>,

    /// Declared city, used by the catalog filter
    pub city: Option<String>,

    /// Typed confirmation policy
    pub policy: ConfirmationPolicy,

    /// Admins of the salons this master belongs to
    #[serde(default)]
    pub salon_admins: Vec<Uuid>,
}

impl Master {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            full_name: None,
            city: None,
            policy: ConfirmationPolicy::default(),
            salon_admins: Vec::new(),
        }
    }

    pub fn with_city(mut self, city: &str) -> Self {
        self.city = Some(city.to_string());
        self
    }

    pub fn with_policy(mut self, policy: ConfirmationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_salon_admin(mut self, admin_id: Uuid) -> Self {
        if !self.salon_admins.contains(&admin_id) {
            self.salon_admins.push(admin_id);
        }
        self
    }

    /// Whether `admin_id` administers a salon this master works in
    pub fn is_managed_by(&self, admin_id: Uuid) -> bool {
        self.salon_admins.contains(&admin_id)
    }
}
