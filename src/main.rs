use std::process::ExitCode;
use std::sync::Arc;

use log::{error, info};

use bufstore::buffer::BufferPoolManager;
use bufstore::common::{init_logger, BufferPoolConfig};
use bufstore::recovery::NoopLogDurability;
use bufstore::storage::disk::DiskManager;

fn run(db_path: &str) -> bufstore::Result<()> {
    let config = BufferPoolConfig::from_env()?;
    let disk_manager = Arc::new(DiskManager::new(db_path)?);
    let bpm = BufferPoolManager::with_config(&config, disk_manager, Arc::new(NoopLogDurability))?;
    info!(
        "buffer pool with {} frames, {:?} replacement",
        bpm.pool_size(),
        config.replacer
    );

    // Write a recognizable pattern to a few new pages
    let mut page_ids = Vec::new();
    for i in 0..3u8 {
        let mut guard = bpm.new_page_guarded()?;
        guard.data_mut().fill(0x40 + i);
        info!("allocated {}", guard.page_id());
        page_ids.push(guard.page_id());
    }

    bpm.flush_all_pages()?;
    info!("flushed {} pages", page_ids.len());

    for &page_id in &page_ids {
        let guard = bpm.fetch_page_read(page_id)?;
        info!(
            "{}: first byte {:#04x}, last byte {:#04x}",
            page_id,
            guard[0],
            guard[guard.len() - 1]
        );
    }

    info!(
        "{} pages on disk, {} reads, {} writes",
        bpm.disk_manager().get_num_pages(),
        bpm.disk_manager().get_num_reads(),
        bpm.disk_manager().get_num_writes()
    );
    Ok(())
}

fn main() -> ExitCode {
    init_logger();

    let db_path = std::env::args().nth(1).unwrap_or_else(|| "demo.db".to_string());
    match run(&db_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
