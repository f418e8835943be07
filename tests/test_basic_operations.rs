use lumokv::{Context, Database, Environment, Error};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

// Common test setup
fn setup_test_db() -> (Database, Context) {
    let db = Database::open_memory().unwrap();
    (db, Context::background())
}

fn read(db: &Database, bucket: &str, key: &[u8]) -> Option<Vec<u8>> {
    db.view(&Context::background(), |_, tx| {
        let bucket = tx.bucket(bucket)?;
        Ok(bucket.get(key)?.value_copy())
    })
    .unwrap()
}

#[test]
fn test_basic_put_get() {
    let (db, ctx) = setup_test_db();

    db.update(&ctx, |_, tx| {
        let bucket = tx.create_bucket("test")?;
        bucket.put(b"test_key", b"test_value")
    })
    .unwrap();

    db.view(&ctx, |_, tx| {
        let item = tx.bucket("test")?.get(b"test_key")?;
        assert!(item.exists());
        assert_eq!(item.key(), b"test_key");
        item.value(|value| {
            assert_eq!(value, Some(&b"test_value"[..]));
            Ok(())
        })
    })
    .unwrap();
}

#[test]
fn test_put_overwrites() {
    let (db, ctx) = setup_test_db();

    db.update(&ctx, |_, tx| {
        let bucket = tx.create_bucket("test")?;
        bucket.put(b"key", b"first")?;
        bucket.put(b"key", b"second")
    })
    .unwrap();

    assert_eq!(read(&db, "test", b"key"), Some(b"second".to_vec()));
}

#[test]
fn test_get_missing_key_is_not_an_error() {
    let (db, ctx) = setup_test_db();
    db.update(&ctx, |_, tx| tx.create_bucket("test").map(|_| ()))
        .unwrap();

    db.view(&ctx, |_, tx| {
        let item = tx.bucket("test")?.get(b"nonexistent_key")?;
        assert!(!item.exists());
        assert_eq!(item.key(), b"nonexistent_key");
        item.value(|value| {
            assert!(value.is_none());
            Ok(())
        })
    })
    .unwrap();
}

#[test]
fn test_delete_operations() {
    let (db, ctx) = setup_test_db();

    db.update(&ctx, |_, tx| {
        let bucket = tx.create_bucket("test")?;
        bucket.put(b"delete_key", b"delete_value")?;
        assert!(bucket.get(b"delete_key")?.exists());
        bucket.delete(b"delete_key")?;
        assert!(!bucket.get(b"delete_key")?.exists());
        // Deleting an absent key succeeds
        bucket.delete(b"never_written")
    })
    .unwrap();

    assert_eq!(read(&db, "test", b"delete_key"), None);
}

#[test]
fn test_delete_committed_key() {
    let (db, ctx) = setup_test_db();
    db.update(&ctx, |_, tx| tx.create_bucket("test")?.put(b"key", b"value"))
        .unwrap();
    db.update(&ctx, |_, tx| tx.bucket("test")?.delete(b"key"))
        .unwrap();

    assert_eq!(read(&db, "test", b"key"), None);
}

#[test]
fn test_prefix_isolation() {
    let (db, ctx) = setup_test_db();

    db.update(&ctx, |_, tx| {
        tx.create_bucket("first")?.put(b"k", b"one")?;
        tx.create_bucket("second")?.put(b"k", b"two")?;
        tx.create_bucket("firsts")?.put(b"other", b"three")
    })
    .unwrap();

    assert_eq!(read(&db, "first", b"k"), Some(b"one".to_vec()));
    assert_eq!(read(&db, "second", b"k"), Some(b"two".to_vec()));
    assert_eq!(read(&db, "first", b"other"), None);
}

#[test]
fn test_update_rolls_back_on_error() {
    let (db, ctx) = setup_test_db();
    db.update(&ctx, |_, tx| tx.create_bucket("test")?.put(b"kept", b"1"))
        .unwrap();

    let result: lumokv::Result<()> = db.update(&ctx, |_, tx| {
        let bucket = tx.bucket("test")?;
        bucket.put(b"partial", b"2")?;
        bucket.delete(b"kept")?;
        tx.create_bucket("created")?;
        Err(Error::other("abort"))
    });
    let err = result.unwrap_err();
    assert!(err.to_string().contains("db update failed"));
    assert!(matches!(err.root(), Error::Other(_)));

    assert_eq!(read(&db, "test", b"partial"), None);
    assert_eq!(read(&db, "test", b"kept"), Some(b"1".to_vec()));
    db.view(&ctx, |_, tx| {
        assert!(tx.bucket("created").map(|_| ()).unwrap_err().is_not_found());
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_update_returns_value() {
    let (db, ctx) = setup_test_db();
    let written = db
        .update(&ctx, |_, tx| {
            let bucket = tx.create_bucket("test")?;
            for i in 0..3 {
                bucket.put(format!("key_{}", i).as_bytes(), b"v")?;
            }
            Ok(3)
        })
        .unwrap();
    assert_eq!(written, 3);
}

#[test]
fn test_view_rejects_writes() {
    let (db, ctx) = setup_test_db();
    db.update(&ctx, |_, tx| tx.create_bucket("test").map(|_| ()))
        .unwrap();

    let err = db
        .view(&ctx, |_, tx| {
            assert!(!tx.is_writable());
            tx.bucket("test")?.put(b"key", b"value")
        })
        .unwrap_err();
    assert!(matches!(err.root(), Error::TxnReadOnly));

    let err = db
        .view(&ctx, |_, tx| tx.create_bucket_if_not_exists("fresh").map(|_| ()))
        .unwrap_err();
    assert!(matches!(err.root(), Error::TxnReadOnly));
}

#[test]
fn test_nested_update_in_update_is_rejected() {
    let (db, ctx) = setup_test_db();

    let err = db
        .update(&ctx, |ctx, tx| {
            tx.create_bucket("outer")?.put(b"k", b"v")?;
            db.update(ctx, |_, tx| tx.create_bucket("inner")?.put(b"k", b"v"))
        })
        .unwrap_err();
    assert!(err.is_transaction_already_open());

    db.view(&ctx, |_, tx| {
        assert!(tx.list_bucket_names()?.is_empty());
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_nested_update_in_view_is_rejected() {
    let (db, ctx) = setup_test_db();

    db.view(&ctx, |ctx, _| {
        assert!(ctx.is_transaction_open());
        let err = db
            .update(ctx, |_, tx| tx.create_bucket("inner")?.put(b"k", b"v"))
            .unwrap_err();
        assert!(err.is_transaction_already_open());
        let err = db.view(ctx, |_, _| Ok(())).unwrap_err();
        assert!(err.is_transaction_already_open());
        Ok(())
    })
    .unwrap();

    db.view(&ctx, |_, tx| {
        assert!(tx.bucket("inner").map(|_| ()).unwrap_err().is_not_found());
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_marker_does_not_leak_to_caller_context() {
    let (db, ctx) = setup_test_db();
    db.view(&ctx, |_, _| Ok(())).unwrap();
    assert!(!ctx.is_transaction_open());
    db.update(&ctx, |_, _| Ok(())).unwrap();
}

#[test]
fn test_cancelled_context() {
    let (db, _) = setup_test_db();
    let (ctx, token) = Context::background().with_cancel();
    db.view(&ctx, |_, _| Ok(())).unwrap();

    token.cancel();
    let err = db.view(&ctx, |_, _| Ok(())).unwrap_err();
    assert!(matches!(err.root(), Error::Cancelled));
    let err = db.update(&ctx, |_, _| Ok(())).unwrap_err();
    assert!(matches!(err.root(), Error::Cancelled));
}

#[test]
fn test_expired_deadline() {
    let (db, _) = setup_test_db();
    let ctx = Context::background().with_timeout(Duration::ZERO);
    let err = db.update(&ctx, |_, _| Ok(())).unwrap_err();
    assert!(matches!(err.root(), Error::DeadlineExceeded));

    let ctx = Context::background().with_timeout(Duration::from_secs(60));
    db.update(&ctx, |_, _| Ok(())).unwrap();
}

#[test]
fn test_independent_contexts_run_concurrently() {
    let db = Arc::new(Database::open_memory().unwrap());
    db.update(&Context::background(), |_, tx| {
        tx.create_bucket("counter").map(|_| ())
    })
    .unwrap();

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                let ctx = Context::background();
                for i in 0..25 {
                    db.update(&ctx, |_, tx| {
                        let key = format!("w{}_{:02}", worker, i);
                        tx.bucket("counter")?.put(key.as_bytes(), b"1")
                    })
                    .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let count = db
        .view(&Context::background(), |_, tx| {
            let mut it = tx.bucket("counter")?.iterator();
            it.rewind();
            let mut count = 0;
            while it.valid() {
                count += 1;
                it.next();
            }
            Ok(count)
        })
        .unwrap();
    assert_eq!(count, 100);
}

#[test]
fn test_closed_database_rejects_transactions() {
    let (db, ctx) = setup_test_db();
    db.close().unwrap();
    let err = db.view(&ctx, |_, _| Ok(())).unwrap_err();
    assert!(matches!(err.root(), Error::EnvClosed));
}

#[test]
fn test_update_on_independent_context_inside_update() {
    let (db, ctx) = setup_test_db();

    db.update(&ctx, |_, tx| {
        tx.create_bucket("outer")?.put(b"k", b"v")?;

        // Reads on a fresh context run alongside the open writer
        let seen = db.view(&Context::background(), |_, tx| {
            Ok(tx.bucket("outer").is_ok())
        })?;
        assert!(!seen);

        // A second writer on this thread fails instead of blocking
        let err = db
            .update(&Context::background(), |_, tx| {
                tx.create_bucket("inner").map(|_| ())
            })
            .unwrap_err();
        assert!(matches!(err.root(), Error::WriterBusy));
        Ok(())
    })
    .unwrap();

    // The writer lock is free again once the outer update finished
    db.update(&Context::background(), |_, tx| {
        tx.create_bucket("inner").map(|_| ())
    })
    .unwrap();
    db.view(&ctx, |_, tx| {
        assert!(tx.bucket("outer")?.get(b"k")?.exists());
        tx.bucket("inner").map(|_| ())
    })
    .unwrap();
}

#[test]
fn test_transaction_limit_counts_views_and_updates() {
    let mut env = Environment::new();
    env.set_max_readers(2).unwrap();
    let db = Database::new(env.open_memory().unwrap());
    let ctx = Context::background();

    db.update(&ctx, |_, _| {
        db.view(&Context::background(), |_, _| {
            let err = db
                .view(&Context::background(), |_, _| Ok(()))
                .unwrap_err();
            assert!(matches!(err.root(), Error::ReadersFull));
            Ok(())
        })
    })
    .unwrap();

    db.view(&ctx, |_, _| Ok(())).unwrap();
}
