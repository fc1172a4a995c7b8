use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// 指定配置文件路径的环境变量。
pub const CONFIG_ENV: &str = "CADVIEW_CONFIG";

/// 未指定输出路径时渲染图片写入的目录。
pub const DEFAULT_OUTPUT_DIR: &str = "workspace/rendered";

/// 默认的中文字体候选列表，按优先级排列。
pub const DEFAULT_FONT_CANDIDATES: [&str; 9] = [
    "PingFang SC",
    "Hiragino Sans GB",
    "Heiti SC",
    "Songti SC",
    "STHeiti",
    "Microsoft YaHei",
    "SimHei",
    "Noto Sans CJK SC",
    "Arial Unicode MS",
];

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub inspect: InspectConfig,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 自动发现配置文件：优先读取环境变量 `CADVIEW_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os(CONFIG_ENV) {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

/// 区域渲染的默认参数。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub output_dir: PathBuf,
    pub output_width: u32,
    pub output_height: u32,
    /// 图纸概览缩略图的边长。
    pub thumbnail_size: u32,
    pub color_by_layer: bool,
    pub maintain_aspect_ratio: bool,
    pub font_candidates: Vec<String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            output_width: 2048,
            output_height: 2048,
            thumbnail_size: 800,
            color_by_layer: true,
            maintain_aspect_ratio: true,
            font_candidates: DEFAULT_FONT_CANDIDATES.map(str::to_string).to_vec(),
        }
    }
}

/// 区域检查与实体提取的输出上限。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct InspectConfig {
    pub max_texts: usize,
    pub max_entities: usize,
    pub preview_max_side: u32,
    pub preview_quality: u8,
}

impl Default for InspectConfig {
    fn default() -> Self {
        Self {
            max_texts: 50,
            max_entities: 100,
            preview_max_side: 768,
            preview_quality: 60,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.render.output_dir, PathBuf::from("workspace/rendered"));
        assert_eq!((cfg.render.output_width, cfg.render.output_height), (2048, 2048));
        assert_eq!(cfg.render.thumbnail_size, 800);
        assert!(cfg.render.color_by_layer);
        assert!(cfg.render.maintain_aspect_ratio);
        assert_eq!(cfg.render.font_candidates.first().map(String::as_str), Some("PingFang SC"));
        assert_eq!(cfg.inspect.max_texts, 50);
        assert_eq!(cfg.inspect.max_entities, 100);
        assert_eq!(cfg.inspect.preview_max_side, 768);
        assert_eq!(cfg.inspect.preview_quality, 60);
    }

    #[test]
    fn load_from_temp_file() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(
            file,
            r#"
            [logging]
            level = "debug"

            [render]
            output_dir = "/tmp/cadview"
            output_width = 1024
            color_by_layer = false
            font_candidates = ["Noto Sans CJK SC"]

            [inspect]
            max_texts = 10
            "#
        )
        .unwrap();

        let cfg = AppConfig::from_file(file.path()).expect("load config");
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.render.output_dir, PathBuf::from("/tmp/cadview"));
        assert_eq!(cfg.render.output_width, 1024);
        assert_eq!(cfg.render.output_height, 2048);
        assert!(!cfg.render.color_by_layer);
        assert_eq!(cfg.render.font_candidates, vec!["Noto Sans CJK SC".to_string()]);
        assert_eq!(cfg.inspect.max_texts, 10);
        assert_eq!(cfg.inspect.max_entities, 100);
    }

    #[test]
    fn invalid_toml_is_reported_with_path() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(file, "[render]\noutput_width = \"wide\"").unwrap();
        let err = AppConfig::from_file(file.path()).expect_err("should fail to parse");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = AppConfig::from_file("/definitely/not/here.toml").expect_err("should fail");
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
