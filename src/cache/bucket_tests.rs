//! Tests for size-class math and bucket accounting.

use super::*;
use crate::bo::BoRecord;

fn cached(handle: u32, size: u64) -> BufferObject {
    BufferObject::from_record(Box::new(BoRecord {
        handle: GemHandle(handle),
        size,
        ..Default::default()
    }))
}

#[test]
fn test_classify_rounds_to_power_of_two_pages() {
    let geometry = BucketGeometry::new(4096, 12);
    assert_eq!(
        geometry.classify(5000),
        SizeClass { size: 8192, bucket: Some(1) }
    );
    assert_eq!(
        geometry.classify(4096),
        SizeClass { size: 4096, bucket: Some(0) }
    );
    assert_eq!(
        geometry.classify(3 * 4096),
        SizeClass { size: 4 * 4096, bucket: Some(2) }
    );
    assert_eq!(geometry.classify(0).bucket, Some(0));
}

#[test]
fn test_classify_oversized_keeps_raw_size() {
    let geometry = BucketGeometry::new(4096, 12);
    assert_eq!(geometry.bucket_size(11), 8 << 20);
    let huge = (8 << 20) + 1;
    assert_eq!(geometry.classify(huge), SizeClass { size: huge, bucket: None });
    assert_eq!(geometry.classify(u64::MAX).bucket, None);
}

#[test]
fn test_release_bucket_requires_exact_class() {
    let geometry = BucketGeometry::new(4096, 12);
    assert_eq!(geometry.release_bucket(8192), Some(1));
    assert_eq!(geometry.release_bucket(12288), None);
    assert_eq!(geometry.release_bucket(5000), None);
    assert_eq!(geometry.release_bucket(16 << 20), None);
    assert_eq!(geometry.release_bucket(0), None);
}

#[test]
fn test_min_entries_halves_per_bucket() {
    let floors: Vec<usize> = (0..9).map(|i| min_entries_for(64, i)).collect();
    assert_eq!(floors, vec![64, 32, 16, 8, 4, 2, 1, 0, 0]);
    assert_eq!(min_entries_for(64, 200), 0);
}

#[test]
fn test_insert_counts_only_above_floor() {
    let mut bucket = Bucket::new(4096, 2);
    assert_eq!(bucket.insert(cached(1, 4096)), 0);
    assert_eq!(bucket.insert(cached(2, 4096)), 0);
    assert_eq!(bucket.insert(cached(3, 4096)), 4096);
    assert!(bucket.is_reclaimable());
    assert_eq!(bucket.handles(), vec![GemHandle(1), GemHandle(2), GemHandle(3)]);
}

#[test]
fn test_removal_uncounts_symmetrically() {
    let mut bucket = Bucket::new(4096, 1);
    let added: u64 = (1..=3).map(|h| bucket.insert(cached(h, 4096))).sum();
    assert_eq!(added, 8192);

    let (newest, bytes) = bucket.commit_newest().unwrap();
    assert_eq!(newest.handle(), GemHandle(3));
    assert_eq!(bytes, 4096);

    let (oldest, bytes) = bucket.commit_removal(0).unwrap();
    assert_eq!(oldest.handle(), GemHandle(1));
    assert_eq!(bytes, 4096);

    let (_, bytes) = bucket.commit_newest().unwrap();
    assert_eq!(bytes, 0, "entry at the floor was never counted");
    assert!(bucket.commit_newest().is_none());
}

#[test]
fn test_peek_does_not_remove() {
    let mut bucket = Bucket::new(4096, 0);
    bucket.insert(cached(1, 4096));
    bucket.insert(cached(2, 4096));
    assert_eq!(bucket.peek_newest().map(BufferObject::handle), Some(GemHandle(2)));
    assert_eq!(bucket.len(), 2);
    assert_eq!(bucket.handle_at(0), Some(GemHandle(1)));
    assert_eq!(bucket.drain().count(), 2);
    assert_eq!(bucket.len(), 0);
}
