//! Request/response surface for hosts that marshal calls as JSON.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use strongbox_core::{
    storage::{KeySecureStore, PlainRecordStore},
    StoredValue,
};
use tracing::instrument;

use crate::secure_storage::{SecureStorage, StorageError};

/// One storage call, e.g. `{"method":"set","key":"token","value":"abc123"}`.
/// Arguments are optional here so that missing ones are reported as caller
/// errors rather than decode failures. An explicit `"value": null` is a value
/// and is stored as JSON null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum StorageRequest {
    Init,
    Get {
        #[serde(default)]
        key: Option<String>,
    },
    Set {
        #[serde(default)]
        key: Option<String>,
        #[serde(default, deserialize_with = "present")]
        value: Option<Value>,
    },
    Remove {
        #[serde(default)]
        key: Option<String>,
    },
    Clear,
    Keys,
}

impl StorageRequest {
    pub fn method(&self) -> &'static str {
        match self {
            StorageRequest::Init => "init",
            StorageRequest::Get { .. } => "get",
            StorageRequest::Set { .. } => "set",
            StorageRequest::Remove { .. } => "remove",
            StorageRequest::Clear => "clear",
            StorageRequest::Keys => "keys",
        }
    }
}

/// Result payload: `{}`, `{"value": ...}` or `{"keys": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StorageResponse {
    Value { value: Option<Value> },
    Keys { keys: Vec<String> },
    Done {},
}

impl<K: KeySecureStore, R: PlainRecordStore> SecureStorage<K, R> {
    /// Validate arguments, then run the request. Terminal result is reported once.
    #[instrument(skip_all, fields(method = request.method()))]
    pub async fn dispatch(&self, request: StorageRequest) -> Result<StorageResponse, StorageError> {
        match request {
            StorageRequest::Init => {
                self.init().await?;
                Ok(StorageResponse::Done {})
            }
            StorageRequest::Get { key } => {
                let key = required(key, "key")?;
                let value = self.get(&key).await?.map(StoredValue::into_json);
                Ok(StorageResponse::Value { value })
            }
            StorageRequest::Set { key, value } => {
                let key = required(key, "key")?;
                let value = required(value, "value")?;
                self.set(&key, &StoredValue::from(value)).await?;
                Ok(StorageResponse::Done {})
            }
            StorageRequest::Remove { key } => {
                let key = required(key, "key")?;
                self.remove(&key).await?;
                Ok(StorageResponse::Done {})
            }
            StorageRequest::Clear => {
                self.clear().await?;
                Ok(StorageResponse::Done {})
            }
            StorageRequest::Keys => Ok(StorageResponse::Keys {
                keys: self.keys().await?,
            }),
        }
    }
}

/// Any value that is present, `null` included, is `Some`.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

fn required<T>(arg: Option<T>, name: &str) -> Result<T, StorageError> {
    arg.ok_or_else(|| StorageError::InvalidInput(format!("must provide {name}")))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use strongbox_core::storage::{InMemoryKeyStore, InMemoryRecordStore};

    use super::*;

    fn storage() -> SecureStorage<InMemoryKeyStore, InMemoryRecordStore> {
        SecureStorage::new(InMemoryKeyStore::new("svc"), InMemoryRecordStore::new("ns"))
    }

    fn request(body: Value) -> StorageRequest {
        serde_json::from_value(body).expect("request should decode")
    }

    #[tokio::test]
    async fn set_get_keys_through_requests() {
        let storage = storage();
        let done = storage
            .dispatch(request(json!({"method": "set", "key": "profile", "value": {"name": "Ada"}})))
            .await
            .expect("set");
        assert_eq!(serde_json::to_value(done).unwrap(), json!({}));

        let got = storage
            .dispatch(request(json!({"method": "get", "key": "profile"})))
            .await
            .expect("get");
        assert_eq!(
            serde_json::to_value(got).unwrap(),
            json!({"value": {"name": "Ada"}})
        );

        let keys = storage.dispatch(StorageRequest::Keys).await.expect("keys");
        assert_eq!(serde_json::to_value(keys).unwrap(), json!({"keys": ["profile"]}));
    }

    #[tokio::test]
    async fn missing_value_is_a_caller_error_and_touches_nothing() {
        let storage = storage();
        let err = storage
            .dispatch(request(json!({"method": "set", "key": "token"})))
            .await
            .expect_err("missing value");
        assert!(matches!(err, StorageError::InvalidInput(ref msg) if msg == "must provide value"));
        assert!(storage.vault().store().is_empty());
    }

    #[tokio::test]
    async fn null_value_is_stored_as_json_null() {
        let storage = storage();
        let set = request(json!({"method": "set", "key": "prefs", "value": null}));
        assert_eq!(
            set,
            StorageRequest::Set {
                key: Some("prefs".into()),
                value: Some(Value::Null),
            }
        );
        storage.dispatch(set).await.expect("null is a value");

        assert_eq!(
            storage.get("prefs").await.unwrap(),
            Some(StoredValue::Json(Value::Null))
        );
        assert_eq!(storage.keys().await.unwrap(), vec!["prefs"]);
    }

    #[tokio::test]
    async fn missing_key_is_a_caller_error() {
        let storage = storage();
        for body in [json!({"method": "get"}), json!({"method": "remove"})] {
            let err = storage.dispatch(request(body)).await.expect_err("missing key");
            assert!(matches!(err, StorageError::InvalidInput(_)));
        }
    }

    #[tokio::test]
    async fn get_of_absent_key_is_null_value() {
        let got = storage()
            .dispatch(StorageRequest::Get {
                key: Some("nothing".into()),
            })
            .await
            .unwrap();
        assert_eq!(serde_json::to_value(got).unwrap(), json!({"value": null}));
    }

    #[test]
    fn unknown_method_fails_to_decode() {
        assert!(serde_json::from_value::<StorageRequest>(json!({"method": "list"})).is_err());
    }
}
