pub mod key_store;
pub mod record_store;

pub use key_store::{Accessibility, InMemoryKeyStore, KeySecureStore, KeyStoreError};
pub use record_store::{InMemoryRecordStore, PlainRecordStore, RecordStoreError};
