use lumokv::{BucketIterator, Context, Database};

fn setup_fruit_db() -> (Database, Context) {
    let db = Database::open_memory().unwrap();
    let ctx = Context::background();
    db.update(&ctx, |_, tx| {
        // Neighbors on both sides of "fruit" in key order
        tx.create_bucket("a")?.put(b"zzz", b"before")?;
        tx.create_bucket("fruits")?.put(b"aaa", b"after")?;
        tx.create_bucket("fruit-x")?.put(b"aaa", b"before")?;

        let fruit = tx.create_bucket("fruit")?;
        fruit.put(b"banana", b"yellow")?;
        fruit.put(b"cherry", b"red")?;
        fruit.put(b"apple", b"green")?;
        Ok(())
    })
    .unwrap();
    (db, ctx)
}

fn collect(mut it: BucketIterator<'_>) -> Vec<String> {
    let mut keys = Vec::new();
    while let Some(item) = it.item() {
        assert!(item.exists());
        keys.push(String::from_utf8(item.key().to_vec()).unwrap());
        it.next();
    }
    it.close();
    keys
}

fn current_key(it: &BucketIterator<'_>) -> Option<String> {
    it.item()
        .map(|item| String::from_utf8(item.key().to_vec()).unwrap())
}

#[test]
fn test_forward_order() {
    let (db, ctx) = setup_fruit_db();
    let keys = db
        .view(&ctx, |_, tx| {
            let mut it = tx.bucket("fruit")?.iterator();
            it.rewind();
            Ok(collect(it))
        })
        .unwrap();
    assert_eq!(keys, vec!["apple", "banana", "cherry"]);
}

#[test]
fn test_reverse_order() {
    let (db, ctx) = setup_fruit_db();
    let keys = db
        .view(&ctx, |_, tx| {
            let mut it = tx.bucket("fruit")?.iterator_reverse();
            it.rewind();
            Ok(collect(it))
        })
        .unwrap();
    assert_eq!(keys, vec!["cherry", "banana", "apple"]);
}

#[test]
fn test_reverse_rewind_on_last_bucket() {
    let (db, ctx) = setup_fruit_db();
    let keys = db
        .view(&ctx, |_, tx| {
            let mut it = tx.bucket("fruits")?.iterator_reverse();
            it.rewind();
            Ok(collect(it))
        })
        .unwrap();
    assert_eq!(keys, vec!["aaa"]);
}

#[test]
fn test_item_values() {
    let (db, ctx) = setup_fruit_db();
    db.view(&ctx, |_, tx| {
        let mut it = tx.bucket("fruit")?.iterator();
        it.rewind();
        let mut values = Vec::new();
        while let Some(item) = it.item() {
            item.value(|value| {
                values.push(value.map(<[u8]>::to_vec));
                Ok(())
            })?;
            it.next();
        }
        assert_eq!(
            values,
            vec![
                Some(b"green".to_vec()),
                Some(b"yellow".to_vec()),
                Some(b"red".to_vec())
            ]
        );
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_forward_seek() {
    let (db, ctx) = setup_fruit_db();
    db.view(&ctx, |_, tx| {
        let bucket = tx.bucket("fruit")?;

        let mut it = bucket.iterator();
        it.seek(b"banana");
        assert_eq!(current_key(&it).as_deref(), Some("banana"));
        it.next();
        assert_eq!(current_key(&it).as_deref(), Some("cherry"));
        it.next();
        assert!(!it.valid());

        // Missing key lands on the next one
        it.seek(b"blueberry");
        assert_eq!(current_key(&it).as_deref(), Some("cherry"));

        // Past the last key leaves the bucket
        it.seek(b"date");
        assert!(!it.valid());
        assert!(it.item().is_none());
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_reverse_seek() {
    let (db, ctx) = setup_fruit_db();
    db.view(&ctx, |_, tx| {
        let bucket = tx.bucket("fruit")?;

        let mut it = bucket.iterator_reverse();
        it.seek(b"banana");
        assert_eq!(current_key(&it).as_deref(), Some("banana"));
        it.next();
        assert_eq!(current_key(&it).as_deref(), Some("apple"));
        it.next();
        assert!(!it.valid());

        // Missing key lands on the previous one
        it.seek(b"blueberry");
        assert_eq!(current_key(&it).as_deref(), Some("banana"));

        it.seek(b"zzz");
        assert_eq!(current_key(&it).as_deref(), Some("cherry"));

        it.seek(b"aaa");
        assert!(!it.valid());
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_empty_bucket_iteration() {
    let (db, ctx) = setup_fruit_db();
    db.update(&ctx, |_, tx| {
        let bucket = tx.create_bucket("empty")?;
        let mut it = bucket.iterator();
        it.rewind();
        assert!(!it.valid());
        let mut it = bucket.iterator_reverse();
        it.rewind();
        assert!(!it.valid());
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_iteration_sees_own_writes() {
    let (db, ctx) = setup_fruit_db();
    let keys = db
        .update(&ctx, |_, tx| {
            let bucket = tx.bucket("fruit")?;
            bucket.delete(b"banana")?;
            bucket.put(b"apricot", b"orange")?;
            let mut it = bucket.iterator();
            it.rewind();
            Ok(collect(it))
        })
        .unwrap();
    assert_eq!(keys, vec!["apple", "apricot", "cherry"]);
}

#[test]
fn test_delete_while_iterating() {
    let (db, ctx) = setup_fruit_db();
    db.update(&ctx, |_, tx| {
        let bucket = tx.bucket("fruit")?;
        let mut it = bucket.iterator_reverse();
        it.rewind();
        while let Some(item) = it.item() {
            let key = item.key().to_vec();
            bucket.delete(&key)?;
            it.next();
        }
        Ok(())
    })
    .unwrap();

    let keys = db
        .view(&ctx, |_, tx| {
            let mut it = tx.bucket("fruit")?.iterator();
            it.rewind();
            Ok(collect(it))
        })
        .unwrap();
    assert!(keys.is_empty());
}

#[test]
fn test_binary_keys_order() {
    let db = Database::open_memory().unwrap();
    let ctx = Context::background();
    db.update(&ctx, |_, tx| {
        let bucket = tx.create_bucket("bin")?;
        for key in [vec![0xFFu8], vec![0x00], vec![0x00, 0x01], vec![0x7F]] {
            bucket.put(&key, b"")?;
        }
        tx.create_bucket("bio")?.put(&[0x00], b"")?;
        Ok(())
    })
    .unwrap();

    db.view(&ctx, |_, tx| {
        let bucket = tx.bucket("bin")?;
        let mut it = bucket.iterator();
        it.rewind();
        let mut keys = Vec::new();
        while let Some(item) = it.item() {
            keys.push(item.key().to_vec());
            it.next();
        }
        assert_eq!(keys, vec![vec![0x00], vec![0x00, 0x01], vec![0x7F], vec![0xFF]]);
        Ok(())
    })
    .unwrap();
}
