//! The storage interface capability objects delegate to.

use crate::{DocumentId, Filter, Result, RoleRecord, StoredDocument};
use serde_json::Value;

/// A storage backend for extension models, documents and roles.
///
/// Backends are shared by every loaded module, so implementations must be
/// safe to call from several tasks at once. Schemas are opaque JSON to the
/// backend; interpreting them is the caller's business.
pub trait Backend: Send + Sync {
    /// Register (or replace) the schema for a model.
    fn register_model(&self, name: &str, schema: &Value) -> Result<()>;

    /// The schema registered for a model, if any.
    fn model_schema(&self, name: &str) -> Result<Option<Value>>;

    /// All documents of `model` matching `filter`, oldest first.
    fn find(&self, model: &str, filter: &Filter) -> Result<Vec<StoredDocument>>;

    /// The oldest document of `model` matching `filter`.
    fn find_one(&self, model: &str, filter: &Filter) -> Result<Option<StoredDocument>> {
        Ok(self.find(model, filter)?.into_iter().next())
    }

    fn get(&self, model: &str, id: DocumentId) -> Result<Option<StoredDocument>>;

    /// Insert the document, or overwrite the stored copy with the same id.
    fn save(&self, document: &StoredDocument) -> Result<()>;

    /// Delete a document. Fails with `NotFound` if it does not exist.
    fn delete(&self, model: &str, id: DocumentId) -> Result<()>;

    /// Create a role with no permissions. Names are unique.
    fn create_role(&self, name: &str) -> Result<RoleRecord>;

    fn role_by_id(&self, id: i64) -> Result<Option<RoleRecord>>;

    fn role_by_name(&self, name: &str) -> Result<Option<RoleRecord>>;

    /// All roles, ordered by id.
    fn list_roles(&self) -> Result<Vec<RoleRecord>>;

    fn rename_role(&self, id: i64, name: &str) -> Result<()>;

    fn delete_role(&self, id: i64) -> Result<()>;
}
