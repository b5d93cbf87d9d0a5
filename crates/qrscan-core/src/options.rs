//! 扫描选项与统计信息（模块）
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// 扫描控制器选项
#[derive(Debug, Clone, PartialEq)]
pub struct ScannerOptions {
    /// 识别到码后是否自动暂停预览
    pub pause_on_detect: bool,
    /// 暂停前的防抖延迟；期间发生恢复则本次暂停作废
    pub pause_delay: Duration,
    /// 帧上下文 → 执行线程的命令通道容量
    pub command_queue: usize,
}

impl Default for ScannerOptions {
    fn default() -> Self {
        Self {
            pause_on_detect: true,
            pause_delay: Duration::ZERO,
            command_queue: 16,
        }
    }
}

/// 配置文件中的 `[scanner]` 表，所有字段可选
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScannerSection {
    #[serde(default)]
    pause_on_detect: Option<bool>,
    #[serde(default)]
    pause_delay_ms: Option<u64>,
    #[serde(default)]
    command_queue: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    scanner: ScannerSection,
}

impl ScannerOptions {
    /// 从 TOML 文本解析，缺省字段取默认值
    pub fn from_toml_str(txt: &str) -> Result<Self> {
        let parsed: ConfigFile = toml::from_str(txt).context("parse scanner config")?;
        let mut opts = Self::default();
        let s = parsed.scanner;
        if let Some(v) = s.pause_on_detect { opts.pause_on_detect = v; }
        if let Some(ms) = s.pause_delay_ms { opts.pause_delay = Duration::from_millis(ms); }
        if let Some(q) = s.command_queue { opts.command_queue = q.max(1); }
        Ok(opts)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let txt = std::fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
        Self::from_toml_str(&txt)
    }
}

/// 控制器运行统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanStats {
    pub frames_applied: usize,
    pub markers_built: usize,
    pub pauses_scheduled: usize,
    pub pauses_applied: usize,
    /// 因代际过期或通道不可用而未执行的暂停
    pub pauses_discarded: usize,
    pub resumes: usize,
    pub callback_failures: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_yields_defaults() {
        assert_eq!(ScannerOptions::from_toml_str("").unwrap(), ScannerOptions::default());
    }

    #[test]
    fn scanner_table_overrides_fields() {
        let opts = ScannerOptions::from_toml_str("[scanner]\npause_delay_ms = 250\ncommand_queue = 0\n").unwrap();
        assert_eq!(opts.pause_delay, Duration::from_millis(250));
        assert_eq!(opts.command_queue, 1);
        assert!(opts.pause_on_detect);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(ScannerOptions::from_toml_str("[scanner]\npause_delay = 3\n").is_err());
    }
}
