//! Sea-ORM entities for lais-store

pub mod kv_entries;

pub use kv_entries::Entity as KvEntries;
