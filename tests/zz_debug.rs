use psm_core::supervisor::Supervisor;

fn temp_supervisor(dir: &tempfile::TempDir) -> Supervisor {
    let catalog = dir.path().join("scripts.json");
    let settings = dir.path().join("settings.json");
    Supervisor::new(catalog.to_str().unwrap(), settings.to_str().unwrap())
}

fn write_script(dir: &tempfile::TempDir, name: &str, body: &str) -> String {
    let path = dir.path().join(name);
    std::fs::write(&path, body).unwrap();
    path.to_string_lossy().to_string()
}

#[tokio::test]
async fn zz_debug_reap() {
    use psm_core::supervisor::process::terminate_pid;

    let dir = tempfile::tempdir().unwrap();
    let mut sup = temp_supervisor(&dir);
    sup.initialize().await.unwrap();

    let path = write_script(&dir, "long.sh", "sleep 30\n");
    let entry = sup.add_script(&path, Some("/bin/sh"), vec![]).unwrap();
    sup.start_script(&entry.id).await.unwrap();
    let pid = sup.tracker.get_pid(&entry.id).unwrap();
    eprintln!("pid={}", pid);

    terminate_pid(pid, true).unwrap();
    for i in 0..10 {
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        let alive = std::path::Path::new(&format!("/proc/{}", pid)).exists();
        eprintln!("tick {} alive_in_proc={}", i, alive);
        sup.monitor_processes().await.unwrap();
        let view = sup.tracker.view(&entry.id).unwrap();
        eprintln!("tick {} state={:?} pid={:?}", i, view.state, view.pid);
    }
}
