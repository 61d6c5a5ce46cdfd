//! Behavioural contract every `ModuleStore` must satisfy.
//!
//! Each check assumes a fresh, empty store.

#![allow(dead_code)]

use bytes::Bytes;
use depot_core::ModuleIdentity;
use depot_storage::{ModuleStore, StorageError};

pub fn id(namespace: &str, name: &str, provider: &str, version: &str) -> ModuleIdentity {
    ModuleIdentity::new(namespace, name, provider, version).unwrap()
}

pub async fn second_upload_is_refused(store: &dyn ModuleStore) {
    let module = id("acme", "network", "aws", "1.0.0");
    store
        .upload_module(&module, Bytes::from_static(b"first"))
        .await
        .unwrap();

    let err = store
        .upload_module(&module, Bytes::from_static(b"second"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::AlreadyExists(_)), "{err:?}");
}

pub async fn unknown_family_lists_empty(store: &dyn ModuleStore) {
    let versions = store
        .list_module_versions("nobody", "nothing", "aws")
        .await
        .unwrap();
    assert!(versions.is_empty());
}

pub async fn missing_module_is_not_found(store: &dyn ModuleStore) {
    let err = store
        .get_module(&id("acme", "network", "aws", "9.9.9"))
        .await
        .unwrap_err();
    assert!(err.is_not_found(), "{err:?}");
    assert!(
        !store
            .module_exists(&id("acme", "network", "aws", "9.9.9"))
            .await
            .unwrap()
    );
}

pub async fn listing_is_scoped_to_family(store: &dyn ModuleStore) {
    for module in [
        id("acme", "vpc", "aws", "1.0.0"),
        id("acme", "vpc", "aws", "1.1.0"),
        id("acme", "vpc", "gcp", "1.0.0"),
        id("acme", "vpc", "aws-legacy", "0.1.0"),
        id("other", "vpc", "aws", "3.0.0"),
    ] {
        store
            .upload_module(&module, Bytes::from_static(b"archive"))
            .await
            .unwrap();
    }

    let mut versions: Vec<String> = store
        .list_module_versions("acme", "vpc", "aws")
        .await
        .unwrap()
        .into_iter()
        .map(|record| {
            assert!(record.download_url.is_none());
            record.identity.version().to_string()
        })
        .collect();
    versions.sort();
    assert_eq!(versions, vec!["1.0.0".to_string(), "1.1.0".to_string()]);
}

pub async fn get_returns_download_url(store: &dyn ModuleStore) {
    let module = id("acme", "dns", "aws", "2.0.0");
    let uploaded = store
        .upload_module(&module, Bytes::from_static(b"archive"))
        .await
        .unwrap();
    let fetched = store.get_module(&module).await.unwrap();

    assert_eq!(fetched.identity, module);
    assert!(fetched.download_url.as_deref().is_some_and(|u| !u.is_empty()));
    assert_eq!(uploaded.download_url, fetched.download_url);
    assert!(store.module_exists(&module).await.unwrap());
}
