//! Core traits for document representation and serialization.
//!
//! A document is any serde type with a string `id` that is unique within its collection.
//! The store never looks at any other field; it round-trips whatever the type contains
//! through BSON.

use bson::{Bson, de::deserialize_from_bson, ser::serialize_to_bson};
use serde::{Serialize, de::DeserializeOwned};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Core trait that all documents stored in a document store must implement.
///
/// # Example
///
/// ```ignore
/// use docvault::document::Document;
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// pub struct Donor {
///     pub id: String,
///     pub first_name: String,
///     pub blood_type: String,
/// }
///
/// impl Document for Donor {
///     fn id(&self) -> &str {
///         &self.id
///     }
/// }
/// ```
pub trait Document: Serialize + DeserializeOwned + Send + Sync + Clone + 'static {
    /// Returns this document's identifier.
    ///
    /// The value must also be serialized under the `id` field, since backends look
    /// documents up by that field.
    fn id(&self) -> &str;
}

/// Extension trait providing BSON conversion for documents.
///
/// Automatically implemented for all types that implement [`Document`].
pub trait DocumentExt: Document {
    /// Converts this document to a BSON value for storage.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Serialization`] if serialization fails and
    /// [`DocumentStoreError::InvalidDocument`] if the value is not a BSON document.
    fn to_bson(&self) -> DocumentStoreResult<Bson>;

    /// Creates a document from a BSON value.
    fn from_bson(bson: Bson) -> DocumentStoreResult<Self>;
}

impl<D: Document> DocumentExt for D {
    fn to_bson(&self) -> DocumentStoreResult<Bson> {
        match serialize_to_bson(self)? {
            bson @ Bson::Document(_) => Ok(bson),
            other => Err(DocumentStoreError::InvalidDocument(format!(
                "expected a document for id {}, got {:?}",
                self.id(),
                other.element_type(),
            ))),
        }
    }

    fn from_bson(bson: Bson) -> DocumentStoreResult<Self> {
        Ok(deserialize_from_bson(bson)?)
    }
}
