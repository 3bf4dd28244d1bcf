//! Database capability: models and their documents.

use crate::error::check;
use crate::{Error, Result, Schema};
use chrono::{DateTime, Utc};
use policy::{Grants, Permission};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use storage::{Backend, DocumentId, Filter, StoredDocument};

/// Access to the host's document storage.
///
/// Reads require `database:read`; registering models and writing documents
/// require `database:write`. Every model and document obtained from here
/// checks the module's grants again on each call.
#[derive(Clone)]
pub struct Database {
    grants: Grants,
    backend: Arc<dyn Backend>,
}

impl Database {
    pub(crate) fn new(grants: Grants, backend: Arc<dyn Backend>) -> Self {
        Self { grants, backend }
    }

    /// Open a model by name.
    pub fn model(&self, name: &str) -> Result<Model> {
        check(&self.grants, Permission::DatabaseRead)?;
        let schema = self
            .backend
            .model_schema(name)?
            .map(serde_json::from_value::<Schema>)
            .transpose()
            .map_err(|e| Error::InvalidSchema(format!("{name}: {e}")))?;
        Ok(self.bind(name, schema))
    }

    /// Register (or replace) a model's schema and open it.
    pub fn register_model(&self, name: &str, schema: Schema) -> Result<Model> {
        check(&self.grants, Permission::DatabaseWrite)?;
        let encoded =
            serde_json::to_value(&schema).map_err(|e| Error::InvalidSchema(e.to_string()))?;
        self.backend.register_model(name, &encoded)?;
        tracing::debug!(model = name, fields = schema.fields.len(), "registered model");
        Ok(self.bind(name, Some(schema)))
    }

    fn bind(&self, name: &str, schema: Option<Schema>) -> Model {
        Model {
            name: name.to_string(),
            schema: schema.map(Arc::new),
            grants: self.grants.clone(),
            backend: Arc::clone(&self.backend),
        }
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

/// A handle on one model.
#[derive(Clone)]
pub struct Model {
    name: String,
    schema: Option<Arc<Schema>>,
    grants: Grants,
    backend: Arc<dyn Backend>,
}

impl Model {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The schema registered for this model, if any.
    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_deref()
    }

    /// All documents matching `filter`.
    pub fn find(&self, filter: &Filter) -> Result<Vec<Document>> {
        check(&self.grants, Permission::DatabaseRead)?;
        let records = self.backend.find(&self.name, filter)?;
        Ok(records.into_iter().map(|r| self.wrap(r)).collect())
    }

    /// The first document matching `filter`.
    pub fn find_one(&self, filter: &Filter) -> Result<Option<Document>> {
        check(&self.grants, Permission::DatabaseRead)?;
        let record = self.backend.find_one(&self.name, filter)?;
        Ok(record.map(|r| self.wrap(r)))
    }

    /// The document with the given id.
    pub fn document(&self, id: DocumentId) -> Result<Option<Document>> {
        check(&self.grants, Permission::DatabaseRead)?;
        let record = self.backend.get(&self.name, id)?;
        Ok(record.map(|r| self.wrap(r)))
    }

    /// Create and persist a new document.
    pub fn new_document(&self, data: Map<String, Value>) -> Result<Document> {
        check(&self.grants, Permission::DatabaseWrite)?;
        if let Some(schema) = &self.schema {
            schema.validate(&data).map_err(Error::InvalidDocument)?;
        }
        let record = StoredDocument::new(&self.name, data);
        self.backend.save(&record)?;
        Ok(self.wrap(record))
    }

    fn wrap(&self, record: StoredDocument) -> Document {
        Document {
            record,
            schema: self.schema.clone(),
            grants: self.grants.clone(),
            backend: Arc::clone(&self.backend),
        }
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

/// A document loaded from (or written to) storage.
///
/// Reads and [`set`](Document::set) work on the loaded copy; nothing reaches
/// storage until [`save`](Document::save).
pub struct Document {
    record: StoredDocument,
    schema: Option<Arc<Schema>>,
    grants: Grants,
    backend: Arc<dyn Backend>,
}

impl Document {
    pub fn id(&self) -> DocumentId {
        self.record.id
    }

    /// Name of the model this document belongs to.
    pub fn model(&self) -> &str {
        &self.record.model
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.record.data
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.record.data.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.record.data.insert(field.into(), value.into());
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.record.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.record.updated_at
    }

    /// Write local changes back to storage.
    pub fn save(&mut self) -> Result<()> {
        check(&self.grants, Permission::DatabaseWrite)?;
        if let Some(schema) = &self.schema {
            schema
                .validate(&self.record.data)
                .map_err(Error::InvalidDocument)?;
        }
        self.record.updated_at = Utc::now();
        self.backend.save(&self.record)?;
        Ok(())
    }

    /// Remove the document from storage.
    pub fn delete(&self) -> Result<()> {
        check(&self.grants, Permission::DatabaseWrite)?;
        self.backend.delete(&self.record.model, self.record.id)?;
        Ok(())
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("record", &self.record)
            .finish_non_exhaustive()
    }
}
