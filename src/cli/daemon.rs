use anyhow::{Context, Result};
use sourcewatch::storage::path_utils;

/// Start the watcher daemon in the background.
pub fn start() -> Result<()> {
    let pid_file = path_utils::pid_path();
    if let Some(pid) = read_pid() {
        if is_process_alive(pid) {
            println!("Daemon already running (PID {})", pid);
            return Ok(());
        }
        // Stale PID file
        let _ = std::fs::remove_file(&pid_file);
    }

    let self_bin = std::env::current_exe().context("Failed to get current exe")?;

    let mut child = std::process::Command::new(&self_bin)
        .args(["daemon", "run-foreground"])
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .context("Failed to start daemon")?;

    println!("Daemon started (PID {})", child.id());
    println!("Log: {}", path_utils::log_path().display());

    // Reap the child if this process outlives it.
    std::thread::spawn(move || {
        let _ = child.wait();
    });

    Ok(())
}

/// SIGTERM, then wait for the daemon to finish its cycle and remove its PID file.
pub fn stop() -> Result<()> {
    let pid_file = path_utils::pid_path();
    let Some(pid) = read_pid() else {
        println!("Daemon is not running");
        return Ok(());
    };
    if !is_process_alive(pid) {
        let _ = std::fs::remove_file(&pid_file);
        println!("Daemon is not running (removed stale PID file)");
        return Ok(());
    }

    terminate(pid);
    for _ in 0..50 {
        if !pid_file.exists() || !is_process_alive(pid) {
            println!("Daemon stopped");
            return Ok(());
        }
        std::thread::sleep(std::time::Duration::from_millis(200));
    }
    println!("Daemon may still be shutting down (PID {})", pid);
    Ok(())
}

pub fn status() -> Result<()> {
    let Some(pid) = read_pid() else {
        println!("Daemon: not running");
        return Ok(());
    };
    if !is_process_alive(pid) {
        println!("Daemon: stale PID file (process {} not found)", pid);
        return Ok(());
    }

    println!("Daemon: running (PID {})", pid);
    let store = super::open_store();
    println!("Store: {} ({} subscriptions)", store.path().display(), store.load().len());
    println!("Log: {}", path_utils::log_path().display());
    Ok(())
}

fn read_pid() -> Option<i32> {
    std::fs::read_to_string(path_utils::pid_path())
        .ok()
        .and_then(|s| s.trim().parse().ok())
}

fn is_process_alive(pid: i32) -> bool {
    #[cfg(unix)]
    {
        unsafe { libc::kill(pid, 0) == 0 }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        true
    }
}

fn terminate(pid: i32) {
    #[cfg(unix)]
    unsafe {
        libc::kill(pid, libc::SIGTERM);
    }
    #[cfg(not(unix))]
    {
        let _ = std::process::Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/F"])
            .output();
    }
}
