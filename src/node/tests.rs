//! Storage Node Tests
//!
//! Validates local persistence and the RPC-facing service of a single node.
//!
//! ## Test Scopes
//! - **LocalStore**: round-trips, overwrite semantics, timestamps, path safety.
//! - **StorageNodeService**: the Retrieve four-tuple, idempotent delete, gossip hook.
//! - **Handlers**: the HTTP surface served by the node router.

#[cfg(test)]
mod tests {
    use crate::membership::table::MembershipTable;
    use crate::membership::types::{Member, NodeId, NodeState};
    use crate::node::handlers::router;
    use crate::node::service::StorageNodeService;
    use crate::node::store::{LocalStore, StoreError};
    use crate::storage::client::{HttpNodeClient, RpcError, StorageNodeClient};
    use crate::storage::protocol::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn open_store(stripes: usize) -> (TempDir, LocalStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path(), stripes).await.unwrap();
        (dir, store)
    }

    async fn open_service(id: &str) -> (TempDir, Arc<StorageNodeService>) {
        let (dir, store) = open_store(16).await;
        let membership = MembershipTable::new(Member::alive(NodeId::from(id), "127.0.0.1:0"));
        (dir, StorageNodeService::new(store, membership))
    }

    fn store_request(bucket: &str, key: &str, data: &[u8], timestamp: i64) -> StoreRequest {
        StoreRequest {
            bucket: bucket.to_string(),
            key: key.to_string(),
            data: data.to_vec(),
            timestamp,
        }
    }

    // ============================================================
    // LOCAL STORE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_local_store_roundtrip() {
        let (dir, store) = open_store(16).await;
        let bucket = "mybucket";
        let key = "folder/myobject.txt";

        store.write(bucket, key, b"hello world", 42).await.unwrap();

        // Bytes land at <data-dir>/<bucket>/<key>
        let on_disk = std::fs::read(dir.path().join(bucket).join(key)).unwrap();
        assert_eq!(on_disk, b"hello world");

        let object = store.read(bucket, key).await.unwrap();
        assert_eq!(object.data, b"hello world");
        assert_eq!(object.timestamp, 42);

        store.delete(bucket, key).await.unwrap();
        assert!(!dir.path().join(bucket).join(key).exists());

        let result = store.read(bucket, key).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_local_store_overwrite_keeps_only_latest() {
        let (_dir, store) = open_store(16).await;

        store.write("b", "k", b"first version", 1).await.unwrap();
        store.write("b", "k", b"second", 2).await.unwrap();

        let object = store.read("b", "k").await.unwrap();
        assert_eq!(object.data, b"second");
        assert_eq!(object.timestamp, 2);
    }

    #[tokio::test]
    async fn test_local_store_does_not_compare_timestamps() {
        let (_dir, store) = open_store(16).await;

        store.write("b", "k", b"newer", 200).await.unwrap();
        store.write("b", "k", b"older", 100).await.unwrap();

        let object = store.read("b", "k").await.unwrap();
        assert_eq!(object.data, b"older");
        assert_eq!(object.timestamp, 100);
    }

    #[tokio::test]
    async fn test_local_store_missing_metadata_reads_as_zero_timestamp() {
        let (dir, store) = open_store(16).await;

        std::fs::create_dir_all(dir.path().join("legacy")).unwrap();
        std::fs::write(dir.path().join("legacy").join("obj"), b"raw bytes").unwrap();

        let object = store.read("legacy", "obj").await.unwrap();
        assert_eq!(object.data, b"raw bytes");
        assert_eq!(object.timestamp, 0);
    }

    #[tokio::test]
    async fn test_local_store_bytes_without_matching_metadata_read_as_zero() {
        let (dir, store) = open_store(16).await;
        store.write("b", "k", b"old", 10).await.unwrap();

        // Data replaced without its record: new bytes, old timestamp on disk
        std::fs::write(dir.path().join("b").join("k"), b"new bytes").unwrap();

        let object = store.read("b", "k").await.unwrap();
        assert_eq!(object.data, b"new bytes");
        assert_eq!(object.timestamp, 0);
    }

    #[tokio::test]
    async fn test_local_store_stale_record_of_same_size_reads_as_zero() {
        let (dir, store) = open_store(16).await;
        let meta_path = dir.path().join(".meta").join("b").join("k");

        store.write("b", "k", b"aaaa", 10).await.unwrap();
        let old_meta = std::fs::read(&meta_path).unwrap();
        store.write("b", "k", b"bbbb", 20).await.unwrap();
        assert_eq!(store.read("b", "k").await.unwrap().timestamp, 20);

        // Second write's record lost: bytes of v2, record of v1
        std::fs::write(&meta_path, old_meta).unwrap();

        let object = store.read("b", "k").await.unwrap();
        assert_eq!(object.data, b"bbbb");
        assert_eq!(object.timestamp, 0);
    }

    #[tokio::test]
    async fn test_local_store_corrupt_metadata_reads_as_zero() {
        let (dir, store) = open_store(16).await;
        store.write("b", "k", b"payload", 5).await.unwrap();

        std::fs::write(dir.path().join(".meta").join("b").join("k"), b"\x01").unwrap();

        let object = store.read("b", "k").await.unwrap();
        assert_eq!(object.data, b"payload");
        assert_eq!(object.timestamp, 0);
    }

    #[tokio::test]
    async fn test_local_store_delete_missing_is_not_found() {
        let (_dir, store) = open_store(16).await;

        let result = store.delete("b", "ghost").await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_local_store_rejects_unsafe_paths() {
        let (_dir, store) = open_store(16).await;

        for (bucket, key) in [
            ("", "k"),
            (".meta", "k"),
            ("a/b", "k"),
            ("b", ""),
            ("b", "../escape"),
            ("b", "a/../../escape"),
            ("b", "a//b"),
            ("b", "./k"),
            ("b", "trailing/"),
        ] {
            let result = store.write(bucket, key, b"x", 1).await;
            assert!(
                matches!(result, Err(StoreError::InvalidPath(_))),
                "{:?}/{:?} should be rejected",
                bucket,
                key
            );
        }
    }

    #[tokio::test]
    async fn test_local_store_single_stripe() {
        let (_dir, store) = open_store(1).await;
        assert_eq!(store.lock_stripes(), 1);

        for i in 0..20 {
            let key = format!("key-{}", i);
            store.write("b", &key, key.as_bytes(), i).await.unwrap();
        }
        for i in 0..20 {
            let key = format!("key-{}", i);
            let object = store.read("b", &key).await.unwrap();
            assert_eq!(object.data, key.as_bytes());
            assert_eq!(object.timestamp, i);
        }
    }

    #[tokio::test]
    async fn test_local_store_concurrent_writers() {
        let (_dir, store) = open_store(4).await;
        let store = Arc::new(store);

        let mut handles = Vec::new();
        for i in 0..32i64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let key = format!("obj-{}", i % 8);
                store.write("b", &key, &i.to_le_bytes(), i).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        for i in 0..8 {
            let object = store.read("b", &format!("obj-{}", i)).await.unwrap();
            // Whatever writer won, bytes and timestamp belong to the same write
            let written = i64::from_le_bytes(object.data.as_slice().try_into().unwrap());
            assert_eq!(written, object.timestamp);
        }
    }

    // ============================================================
    // SERVICE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_service_retrieve_reports_found_data_timestamp() {
        let (_dir, service) = open_service("node-1").await;

        service
            .store(&store_request("b", "k", b"payload", 77))
            .await
            .unwrap();

        let resp = service
            .retrieve(&RetrieveRequest {
                bucket: "b".to_string(),
                key: "k".to_string(),
            })
            .await
            .unwrap();
        assert!(resp.found);
        assert_eq!(resp.data, b"payload");
        assert_eq!(resp.timestamp, 77);
    }

    #[tokio::test]
    async fn test_service_retrieve_missing_is_not_found_response() {
        let (_dir, service) = open_service("node-1").await;

        let resp = service
            .retrieve(&RetrieveRequest {
                bucket: "b".to_string(),
                key: "missing".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(resp, RetrieveResponse::not_found());
    }

    #[tokio::test]
    async fn test_service_delete_missing_is_acknowledged() {
        let (_dir, service) = open_service("node-1").await;

        let resp = service
            .delete(&DeleteRequest {
                bucket: "b".to_string(),
                key: "missing".to_string(),
            })
            .await
            .unwrap();
        assert!(resp.success);
    }

    #[tokio::test]
    async fn test_service_as_client_maps_invalid_path_to_rejected() {
        let (_dir, service) = open_service("node-1").await;
        let client: Arc<dyn StorageNodeClient> = service.clone();

        let result = client.store(&store_request("b", "../x", b"x", 1)).await;
        assert!(matches!(result, Err(RpcError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_service_gossip_merges_sender_and_members() {
        let (_dir, service) = open_service("node-1").await;

        let resp = service.gossip(GossipMessage {
            from: Member::alive(NodeId::from("node-2"), "10.0.0.2:9101"),
            members: vec![Member::alive(NodeId::from("node-3"), "10.0.0.3:9101")],
        });

        assert!(resp.ack);
        assert_eq!(resp.members.len(), 3);

        let status = service.cluster_status();
        assert_eq!(status.node_id, NodeId::from("node-1"));
        assert!(status.members.iter().all(|m| m.state == NodeState::Alive));
    }

    // ============================================================
    // HTTP HANDLER TESTS
    // ============================================================

    #[tokio::test]
    async fn test_http_roundtrip_through_router() {
        let (_dir, service) = open_service("node-http").await;
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(service)).await.unwrap();
        });

        let client = HttpNodeClient::new(&addr.to_string());

        let stored = client
            .store(&store_request("photos", "2024/cat.png", &[0, 1, 2, 255], 9))
            .await
            .unwrap();
        assert!(stored.success);

        let resp = client
            .retrieve(&RetrieveRequest {
                bucket: "photos".to_string(),
                key: "2024/cat.png".to_string(),
            })
            .await
            .unwrap();
        assert!(resp.found);
        assert_eq!(resp.data, vec![0, 1, 2, 255]);
        assert_eq!(resp.timestamp, 9);

        let deleted = client
            .delete(&DeleteRequest {
                bucket: "photos".to_string(),
                key: "2024/cat.png".to_string(),
            })
            .await
            .unwrap();
        assert!(deleted.success);

        let status = client.cluster_status().await.unwrap();
        assert_eq!(status.node_id, NodeId::from("node-http"));
    }

    #[tokio::test]
    async fn test_http_invalid_path_is_bad_request() {
        let (_dir, service) = open_service("node-http").await;
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(service)).await.unwrap();
        });

        let client = HttpNodeClient::new(&addr.to_string());
        let result = client.store(&store_request(".meta", "k", b"x", 1)).await;

        assert!(matches!(result, Err(RpcError::Status(400))));
    }
}
