use chrono::Local;
use uuid::Uuid;

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S%6f";
const TABLE_SUFFIX: &str = "_tmp";

/// Allocates names for generated tables:
/// `<schema>.<prefix>_<logical>_<timestamp>_<uid>_tmp`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNamer {
    schema: String,
    prefix: String,
}

impl TableNamer {
    pub fn new(schema: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            prefix: prefix.into(),
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn name(&self, logical: &str) -> String {
        let timestamp = Local::now().format(TIMESTAMP_FORMAT);
        let uid = Uuid::new_v4().simple().to_string();
        format!(
            "{}.{}_{}_{}_{}{}",
            self.schema,
            self.prefix,
            logical,
            timestamp,
            &uid[..8],
            TABLE_SUFFIX
        )
    }

    /// Recovers the logical name from a generated table name. Parsing runs
    /// from the right so logical names containing underscores survive.
    pub fn logical_name(&self, table: &str) -> Option<String> {
        let unqualified = table.rsplit('.').next()?;
        let body = unqualified
            .strip_prefix(self.prefix.as_str())?
            .strip_prefix('_')?
            .strip_suffix(TABLE_SUFFIX)?;

        let mut parts = body.rsplitn(3, '_');
        let uid = parts.next()?;
        let timestamp = parts.next()?;
        let logical = parts.next()?;

        let well_formed = uid.len() == 8
            && uid.chars().all(|c| c.is_ascii_hexdigit())
            && timestamp.len() == 20
            && timestamp.chars().all(|c| c.is_ascii_digit());
        if !well_formed || logical.is_empty() {
            return None;
        }
        Some(logical.to_string())
    }
}
