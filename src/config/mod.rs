pub mod detector;
pub mod job;
pub mod merged;
pub mod settings;

use std::path::Path;

use settings::Settings;
use tracing::debug;

/// ジョブファイルと同じディレクトリで探す設定ファイル名。
pub const SETTINGS_FILE_NAME: &str = "settings.yaml";

/// ジョブファイルの隣の settings.yaml を読む。なければ既定値。
pub fn load_settings_for_job(job_file_path: &Path) -> crate::error::Result<Settings> {
    let dir = job_file_path.parent().ok_or_else(|| {
        crate::error::RegionError::config(format!(
            "cannot determine directory of job file '{}'",
            job_file_path.display()
        ))
    })?;

    let settings_path = dir.join(SETTINGS_FILE_NAME);
    if !settings_path.exists() {
        return Ok(Settings::default());
    }
    debug!(path = %settings_path.display(), "loading settings");
    Settings::from_file(&settings_path)
}
