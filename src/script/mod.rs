use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 스크립트 엔트리 — 사용자가 카탈로그에 추가한 관리 대상 스크립트
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptEntry {
    pub id: String,                   // 고유 ID (uuid)
    pub name: String,                 // 파일명에서 유도된 이름
    pub display_name: String,         // 사용자 지정 표시 이름 (rename 가능)
    pub path: String,                 // 스크립트 파일 경로
    pub interpreter: String,          // 인터프리터 실행 파일 경로
    #[serde(default)]
    pub args: Vec<String>,            // 추가 인터프리터/스크립트 플래그
    /// Start this script again when the daemon boots. Mirrors the running
    /// state at the time the catalog was last saved.
    #[serde(default)]
    pub autostart: bool,
}

impl ScriptEntry {
    pub fn new(path: &str, interpreter: &str) -> Self {
        let name = Path::new(path)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string());
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            display_name: name.clone(),
            name,
            path: path.to_string(),
            interpreter: interpreter.to_string(),
            args: Vec::new(),
            autostart: false,
        }
    }
}

/// 스크립트 카탈로그 저장소 — scripts.json 관리
pub struct ScriptCatalog {
    file_path: PathBuf,
    scripts: Vec<ScriptEntry>,
}

impl ScriptCatalog {
    pub fn new(file_path: &str) -> Self {
        Self {
            file_path: PathBuf::from(file_path),
            scripts: Vec::new(),
        }
    }

    /// 파일에서 카탈로그 로드
    pub fn load(&mut self) -> Result<()> {
        if !self.file_path.exists() {
            tracing::info!("Script catalog does not exist yet, starting empty");
            self.scripts = Vec::new();
            return Ok(());
        }

        let content = fs::read_to_string(&self.file_path)?;
        self.scripts = serde_json::from_str(&content)?;
        tracing::info!("Loaded {} scripts from catalog", self.scripts.len());
        Ok(())
    }

    /// 파일에 카탈로그 저장
    pub fn save(&self) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.scripts)?;
        fs::write(&self.file_path, content)?;
        tracing::debug!("Saved {} scripts to catalog", self.scripts.len());
        Ok(())
    }

    /// 스크립트 추가
    pub fn add(&mut self, entry: ScriptEntry) -> Result<()> {
        self.scripts.push(entry);
        self.save()?;
        Ok(())
    }

    /// 스크립트 제거
    pub fn remove(&mut self, id: &str) -> Result<()> {
        let before = self.scripts.len();
        self.scripts.retain(|s| s.id != id);
        if self.scripts.len() == before {
            anyhow::bail!("Script not found: {}", id);
        }
        self.save()?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&ScriptEntry> {
        self.scripts.iter().find(|s| s.id == id)
    }

    pub fn list(&self) -> &[ScriptEntry] {
        &self.scripts
    }

    /// 전체 엔트리 교체 업데이트
    pub fn update(&mut self, id: &str, entry: ScriptEntry) -> Result<()> {
        if let Some(pos) = self.scripts.iter().position(|s| s.id == id) {
            self.scripts[pos] = entry;
            self.save()?;
            Ok(())
        } else {
            Err(anyhow::anyhow!("Script not found: {}", id))
        }
    }

    /// 표시 이름 변경
    pub fn rename(&mut self, id: &str, display_name: &str) -> Result<()> {
        let entry = self
            .scripts
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| anyhow::anyhow!("Script not found: {}", id))?;
        entry.display_name = display_name.to_string();
        self.save()?;
        Ok(())
    }

    /// autostart 플래그 일괄 기록 (데몬 종료 직전 실행 상태 보존용)
    pub fn set_autostart(&mut self, id: &str, autostart: bool) -> Result<()> {
        let entry = self
            .scripts
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| anyhow::anyhow!("Script not found: {}", id))?;
        entry.autostart = autostart;
        self.save()?;
        Ok(())
    }
}
