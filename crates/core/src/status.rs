//! Status helper enums mapping to SMALLINT lookup tables.
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! in the corresponding lookup table. On the wire the variants serialize
//! as their lowercase names.

/// Status ID type matching SMALLINT in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:literal => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
            serde::Serialize, serde::Deserialize,
        )]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Look up a variant by its database status ID.
            pub fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( $val => Some(Self::$variant), )+
                    _ => None,
                }
            }

            /// Lowercase name used on the wire and in logs.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $label, )+
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

define_status_enum! {
    /// Pipeline stage of a session. Declaration order is execution order.
    Stage {
        Warmup = 1 => "warmup",
        Scraping = 2 => "scraping",
        Validation = 3 => "validation",
    }
}

define_status_enum! {
    /// Status of the session's current stage.
    SessionStatus {
        Pending = 1 => "pending",
        Completed = 2 => "completed",
        Failed = 3 => "failed",
    }
}

define_status_enum! {
    /// Overall outcome of a job.
    JobStatus {
        Pending = 1 => "pending",
        Completed = 2 => "completed",
        Error = 3 => "error",
    }
}

define_status_enum! {
    /// Validation verdict of a scraped item.
    ItemStatus {
        Pending = 1 => "pending",
        Approved = 2 => "approved",
        Disqualified = 3 => "disqualified",
    }
}

impl Stage {
    /// The last stage of the pipeline.
    pub const FINAL: Stage = Stage::Validation;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_are_ordered_by_execution() {
        assert!(Stage::Warmup < Stage::Scraping);
        assert!(Stage::Scraping < Stage::Validation);
        assert_eq!(Stage::FINAL, Stage::Validation);
    }

    #[test]
    fn ids_round_trip_through_lookup() {
        for status in [JobStatus::Pending, JobStatus::Completed, JobStatus::Error] {
            assert_eq!(JobStatus::from_id(status.id()), Some(status));
        }
        assert_eq!(SessionStatus::from_id(0), None);
        assert_eq!(Stage::from_id(4), None);
    }

    #[test]
    fn serializes_as_lowercase_name() {
        let json = serde_json::to_string(&SessionStatus::Failed).unwrap();
        assert_eq!(json, "\"failed\"");
        let stage: Stage = serde_json::from_str("\"scraping\"").unwrap();
        assert_eq!(stage, Stage::Scraping);
        assert_eq!(ItemStatus::Disqualified.to_string(), "disqualified");
    }
}
