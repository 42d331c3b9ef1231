use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bytes::{Bytes, BytesMut};
use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, trace};

use crate::common::{PageId, Result, StorageError, PAGE_SIZE};

use super::DiskManager;

/// Capacity of the request queue shared by the workers
const REQUEST_QUEUE_DEPTH: usize = 128;

/// Represents a disk I/O request.
/// Every request carries its own reply channel, so the result of the I/O,
/// including the error, goes back to the thread that scheduled it.
pub enum DiskRequest {
    Read {
        page_id: PageId,
        reply: Sender<Result<Bytes>>,
    },
    Write {
        page_id: PageId,
        data: Bytes,
        reply: Sender<Result<()>>,
    },
}

impl DiskRequest {
    pub fn page_id(&self) -> PageId {
        match self {
            DiskRequest::Read { page_id, .. } | DiskRequest::Write { page_id, .. } => *page_id,
        }
    }
}

/// DiskScheduler manages background worker threads that process disk I/O requests.
/// Workers pull from one multi-consumer queue, so independent reads run in
/// parallel against the disk manager's shared latch.
pub struct DiskScheduler {
    /// The disk manager for actual I/O operations
    disk_manager: Arc<DiskManager>,
    /// Channel sender for queuing requests; taken on drop to stop the workers
    request_sender: Option<Sender<DiskRequest>>,
    /// Handles to the background worker threads
    workers: Vec<JoinHandle<()>>,
}

impl DiskScheduler {
    /// Creates a new DiskScheduler with a single worker thread.
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        Self::with_workers(disk_manager, 1)
    }

    /// Creates a new DiskScheduler with `num_workers` worker threads (at least one).
    pub fn with_workers(disk_manager: Arc<DiskManager>, num_workers: usize) -> Self {
        let (sender, receiver) = bounded::<DiskRequest>(REQUEST_QUEUE_DEPTH);

        let workers = (0..num_workers.max(1))
            .map(|_| {
                let dm = Arc::clone(&disk_manager);
                let rx = receiver.clone();
                thread::spawn(move || Self::run_worker(dm, rx))
            })
            .collect();

        debug!("disk scheduler started with {} workers", num_workers.max(1));

        Self {
            disk_manager,
            request_sender: Some(sender),
            workers,
        }
    }

    /// Schedules a disk request for processing by the background workers.
    pub fn schedule(&self, request: DiskRequest) -> Result<()> {
        let sender = self
            .request_sender
            .as_ref()
            .ok_or_else(|| StorageError::DiskScheduler("scheduler is shut down".into()))?;
        sender
            .send(request)
            .map_err(|e| StorageError::DiskScheduler(format!("Failed to schedule request: {}", e)))
    }

    /// Schedules a read request and waits for the page bytes.
    pub fn schedule_read_sync(&self, page_id: PageId) -> Result<Bytes> {
        let (tx, rx) = bounded(1);
        self.schedule(DiskRequest::Read { page_id, reply: tx })?;

        rx.recv().map_err(|e| {
            StorageError::DiskScheduler(format!("Failed to receive completion: {}", e))
        })?
    }

    /// Schedules a write request and waits for completion.
    pub fn schedule_write_sync(&self, page_id: PageId, data: Bytes) -> Result<()> {
        if data.len() != PAGE_SIZE {
            return Err(StorageError::InvalidBufferSize {
                expected: PAGE_SIZE,
                actual: data.len(),
            });
        }

        let (tx, rx) = bounded(1);
        self.schedule(DiskRequest::Write {
            page_id,
            data,
            reply: tx,
        })?;

        rx.recv().map_err(|e| {
            StorageError::DiskScheduler(format!("Failed to receive completion: {}", e))
        })?
    }

    /// Worker loop: runs until every sender is gone and the queue is drained.
    fn run_worker(disk_manager: Arc<DiskManager>, receiver: Receiver<DiskRequest>) {
        while let Ok(request) = receiver.recv() {
            Self::process_request(&disk_manager, request);
        }
    }

    fn process_request(disk_manager: &DiskManager, request: DiskRequest) {
        trace!("processing disk request for {}", request.page_id());
        match request {
            DiskRequest::Read { page_id, reply } => {
                let mut buf = BytesMut::zeroed(PAGE_SIZE);
                let result = disk_manager
                    .read_page(page_id, &mut buf)
                    .map(|()| buf.freeze());
                // The requester may have given up; nothing to report to.
                let _ = reply.send(result);
            }
            DiskRequest::Write {
                page_id,
                data,
                reply,
            } => {
                let _ = reply.send(disk_manager.write_page(page_id, &data));
            }
        }
    }

    /// Returns a reference to the underlying DiskManager.
    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        // Closing the queue lets the workers drain it and exit
        self.request_sender.take();

        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_disk_scheduler_read_write() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let scheduler = DiskScheduler::new(dm);

        let page_id = scheduler.disk_manager().allocate_page();

        let mut write_data = vec![0u8; PAGE_SIZE];
        write_data[0] = 42;
        write_data[100] = 255;
        scheduler
            .schedule_write_sync(page_id, Bytes::from(write_data))
            .unwrap();

        let read_data = scheduler.schedule_read_sync(page_id).unwrap();

        assert_eq!(read_data.len(), PAGE_SIZE);
        assert_eq!(read_data[0], 42);
        assert_eq!(read_data[100], 255);
    }

    #[test]
    fn test_disk_scheduler_multiple_workers() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let scheduler = DiskScheduler::with_workers(dm, 4);

        let page_ids: Vec<_> = (0..8)
            .map(|_| scheduler.disk_manager().allocate_page())
            .collect();

        for (i, &pid) in page_ids.iter().enumerate() {
            scheduler
                .schedule_write_sync(pid, Bytes::from(vec![i as u8; PAGE_SIZE]))
                .unwrap();
        }

        for (i, &pid) in page_ids.iter().enumerate() {
            let data = scheduler.schedule_read_sync(pid).unwrap();
            assert!(data.iter().all(|&b| b == i as u8));
        }
    }

    #[test]
    fn test_disk_scheduler_propagates_errors() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let scheduler = DiskScheduler::new(dm);

        let err = scheduler.schedule_read_sync(PageId::new(3)).unwrap_err();
        assert!(matches!(err, StorageError::ReadPastEnd { num_pages: 0, .. }));

        let err = scheduler
            .schedule_write_sync(PageId::new(0), Bytes::from_static(b"short"))
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidBufferSize { .. }));
    }
}
