use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A YARA rule by name.
///
/// Rows are created lazily on first observation and are never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: Uuid,
    pub name: String,
}
