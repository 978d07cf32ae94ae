//! Mirrors a real directory through the inode cache core and runs a handful
//! of operations against it, printing cache/state stats as it goes. Stands
//! in for a wire-dispatch layer, which this crate does not implement.

mod fs;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use nfs_inode_cache::backing::{NewFileSpec, OpenFlags};
use nfs_inode_cache::config::Config;
use nfs_inode_cache::context::Context;
use nfs_inode_cache::ops;
use nfs_inode_cache::ops::create::{create, CreateMode};
use nfs_inode_cache::Core;

use fs::LocalDirBacking;

#[derive(Parser)]
#[command(about = "Mirrors a directory through the inode cache core")]
struct Args {
    /// Directory to mirror. Must already exist.
    root: PathBuf,

    /// How many seconds to let the reclaimer/reaper threads run before
    /// exercising a few operations and shutting down.
    #[arg(long, default_value_t = 1)]
    settle_seconds: u64,
}

fn main() {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();
    let backing = Arc::new(LocalDirBacking::new(&args.root).expect("failed to open mirrored directory"));
    let root_handle = backing.root_handle();

    let core = Core::init(backing.clone(), Config::default());
    std::thread::sleep(Duration::from_secs(args.settle_seconds));

    let root = core.cache.index.get_or_insert(&root_handle).expect("root handle must resolve");
    let ctx = Context::root();

    let page = ops::readdir::readdir(&core.cache, &root, 0, None, &ctx).expect("readdir failed");
    tracing::info!(entries = page.entries.len(), "listed mirrored root");
    for (name, _) in &page.entries {
        tracing::info!(name = %String::from_utf8_lossy(name), "found entry");
    }

    let spec = NewFileSpec { mode: 0o644, uid: ctx.uid, gid: ctx.gid };
    let scratch = create(&core.cache, &root, b".mirrorcache-probe", CreateMode::Regular, &spec, &ctx).expect("create failed");
    ops::write::write(&core.cache, &scratch, 0, b"mirrorcache was here\n", &ctx).expect("write failed");
    let fd = nfs_inode_cache::fd_cache::ensure_open(&scratch, &*core.cache.backing, OpenFlags::Read, &core.cache.lru);
    tracing::info!(opened = fd.is_ok(), "reopened probe file for read");
    ops::remove::remove(&core.cache, &root, b".mirrorcache-probe", &ctx).expect("remove failed");

    tracing::info!(
        entries = core.cache.lru.entries_count(),
        open_fds = core.cache.lru.open_fd_count(),
        "final cache occupancy"
    );

    core.shutdown();
}
