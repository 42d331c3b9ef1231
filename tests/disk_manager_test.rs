//! Integration tests for the disk manager and scheduler

use std::sync::Arc;
use std::thread;

use bufstore::common::{PageId, StorageError, PAGE_SIZE};
use bufstore::storage::disk::{DiskManager, DiskScheduler};
use bytes::Bytes;
use tempfile::NamedTempFile;

fn filled(byte: u8) -> [u8; PAGE_SIZE] {
    [byte; PAGE_SIZE]
}

#[test]
fn test_disk_manager_create_file() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::new(temp_file.path()).unwrap();

    assert_eq!(dm.get_num_pages(), 0);
    assert_eq!(dm.get_num_reads(), 0);
    assert_eq!(dm.get_num_writes(), 0);
    assert_eq!(dm.get_db_path(), temp_file.path().to_string_lossy());
}

#[test]
fn test_disk_manager_allocate_pages() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::new(temp_file.path()).unwrap();

    for i in 0..10 {
        assert_eq!(dm.allocate_page(), PageId::new(i));
    }

    assert_eq!(dm.get_num_pages(), 10);
}

#[test]
fn test_disk_manager_read_write_page() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::new(temp_file.path()).unwrap();

    let page_id = dm.allocate_page();

    let mut write_data = [0u8; PAGE_SIZE];
    for (i, byte) in write_data.iter_mut().enumerate() {
        *byte = (i % 256) as u8;
    }
    dm.write_page(page_id, &write_data).unwrap();

    let mut read_data = [0u8; PAGE_SIZE];
    dm.read_page(page_id, &mut read_data).unwrap();

    assert_eq!(write_data, read_data);
}

#[test]
fn test_disk_manager_reopen_keeps_pages() {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_path_buf();

    {
        let dm = DiskManager::new(&path).unwrap();
        let p0 = dm.allocate_page();
        let p1 = dm.allocate_page();
        dm.write_page(p0, &filled(0x42)).unwrap();
        dm.write_page(p1, &filled(0xAA)).unwrap();
    }

    let dm = DiskManager::new(&path).unwrap();
    assert_eq!(dm.get_num_pages(), 2);

    let mut data = [0u8; PAGE_SIZE];
    dm.read_page(PageId::new(0), &mut data).unwrap();
    assert!(data.iter().all(|&b| b == 0x42));
    dm.read_page(PageId::new(1), &mut data).unwrap();
    assert!(data.iter().all(|&b| b == 0xAA));

    // New allocations continue after the existing pages
    assert_eq!(dm.allocate_page(), PageId::new(2));
}

#[test]
fn test_disk_manager_boundary_bytes_survive() {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_path_buf();
    let patterns = [0x00u8, 0xFF, 0xAA, 0x55];

    {
        let dm = DiskManager::new(&path).unwrap();
        for &pattern in &patterns {
            let page_id = dm.allocate_page();
            dm.write_page(page_id, &filled(pattern)).unwrap();
        }
    }

    let dm = DiskManager::new(&path).unwrap();
    for (i, &pattern) in patterns.iter().enumerate() {
        let mut data = [0x11u8; PAGE_SIZE];
        dm.read_page(PageId::new(i as u32), &mut data).unwrap();
        assert_eq!(data[0], pattern);
        assert_eq!(data[PAGE_SIZE - 1], pattern);
    }
}

#[test]
fn test_disk_manager_random_access() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::new(temp_file.path()).unwrap();

    let page_ids: Vec<_> = (0..10).map(|_| dm.allocate_page()).collect();

    let write_order = [5, 2, 8, 0, 7, 3, 9, 1, 6, 4];
    for &i in &write_order {
        let mut data = [0u8; PAGE_SIZE];
        data[0] = i as u8;
        dm.write_page(page_ids[i], &data).unwrap();
    }

    for (i, &page_id) in page_ids.iter().enumerate() {
        let mut data = [0u8; PAGE_SIZE];
        dm.read_page(page_id, &mut data).unwrap();
        assert_eq!(data[0], i as u8);
    }
}

#[test]
fn test_disk_manager_sparse_write_grows_file() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::new(temp_file.path()).unwrap();

    dm.write_page(PageId::new(5), &filled(7)).unwrap();
    assert_eq!(dm.get_num_pages(), 6);

    // The hole reads back as zeros
    let mut data = [0xFFu8; PAGE_SIZE];
    dm.read_page(PageId::new(2), &mut data).unwrap();
    assert!(data.iter().all(|&b| b == 0));

    // Writing a lower page never shrinks the count
    dm.write_page(PageId::new(1), &filled(1)).unwrap();
    assert_eq!(dm.get_num_pages(), 6);
    assert_eq!(dm.allocate_page(), PageId::new(6));
}

#[test]
fn test_disk_manager_read_past_end() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::new(temp_file.path()).unwrap();

    let page_id = dm.allocate_page();
    dm.write_page(page_id, &filled(3)).unwrap();

    let mut data = [0u8; PAGE_SIZE];
    let err = dm.read_page(PageId::new(1), &mut data).unwrap_err();
    assert!(matches!(
        err,
        StorageError::ReadPastEnd {
            num_pages: 1,
            ..
        }
    ));
    assert_eq!(err.page_id(), Some(PageId::new(1)));
}

#[test]
fn test_disk_manager_deallocate_zeroes_page() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::new(temp_file.path()).unwrap();

    let page_id = dm.allocate_page();
    dm.write_page(page_id, &filled(0x99)).unwrap();
    dm.deallocate_page(page_id).unwrap();

    let mut data = [0xFFu8; PAGE_SIZE];
    dm.read_page(page_id, &mut data).unwrap();
    assert!(data.iter().all(|&b| b == 0));

    // The id is not handed out again
    assert_eq!(dm.get_num_pages(), 1);
    assert_eq!(dm.allocate_page(), PageId::new(1));
}

#[test]
fn test_disk_manager_concurrent_readers() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());

    for i in 0..8u8 {
        let page_id = dm.allocate_page();
        dm.write_page(page_id, &filled(i)).unwrap();
    }

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let dm = Arc::clone(&dm);
            thread::spawn(move || {
                let mut data = [0u8; PAGE_SIZE];
                for round in 0..50u32 {
                    let page = round % 8;
                    dm.read_page(PageId::new(page), &mut data).unwrap();
                    assert!(data.iter().all(|&b| b == page as u8));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(dm.get_num_reads(), 200);
}

#[test]
fn test_disk_scheduler_concurrent_requests() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let scheduler = Arc::new(DiskScheduler::with_workers(Arc::clone(&dm), 4));

    let page_ids: Vec<_> = (0..16).map(|_| dm.allocate_page()).collect();

    let handles: Vec<_> = page_ids
        .iter()
        .map(|&page_id| {
            let scheduler = Arc::clone(&scheduler);
            thread::spawn(move || {
                let byte = page_id.as_u32() as u8;
                scheduler
                    .schedule_write_sync(page_id, Bytes::from(vec![byte; PAGE_SIZE]))
                    .unwrap();
                let data = scheduler.schedule_read_sync(page_id).unwrap();
                assert_eq!(data.len(), PAGE_SIZE);
                assert!(data.iter().all(|&b| b == byte));
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(dm.get_num_writes(), 16);
    assert_eq!(dm.get_num_reads(), 16);
}
