use std::sync::Arc;

use tracing::{info, warn};
use usvg::fontdb;

/// 已加载的字体库与选定的字体族。
#[derive(Clone)]
pub struct FontSelection {
    database: Arc<fontdb::Database>,
    family: Option<String>,
}

impl FontSelection {
    /// 加载系统字体并按候选列表选择字体族。
    pub fn load_system(candidates: &[String]) -> Self {
        let mut database = fontdb::Database::new();
        database.load_system_fonts();
        Self::from_database(database, candidates)
    }

    /// 在给定字体库中依次探测候选字体族，均不可用时退回字体库中的第一个字体族。
    pub fn from_database(database: fontdb::Database, candidates: &[String]) -> Self {
        let preferred = candidates.iter().find(|candidate| {
            database
                .faces()
                .any(|face| face.families.iter().any(|(name, _)| name == *candidate))
        });
        let family = match preferred {
            Some(name) => Some(name.clone()),
            None => database
                .faces()
                .find_map(|face| face.families.first().map(|(name, _)| name.clone())),
        };

        match &family {
            Some(name) if preferred.is_some() => {
                info!(family = %name, faces = database.len(), "选用中文字体");
            }
            Some(name) => {
                warn!(family = %name, faces = database.len(), "未找到候选中文字体，使用兜底字体");
            }
            None => warn!("系统中没有可用字体，文字将不会被绘制"),
        }

        Self {
            database: Arc::new(database),
            family,
        }
    }

    /// 空字体库，不绘制任何文字。
    pub fn empty() -> Self {
        Self {
            database: Arc::new(fontdb::Database::new()),
            family: None,
        }
    }

    #[inline]
    pub fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    #[inline]
    pub fn has_fonts(&self) -> bool {
        self.family.is_some() && !self.database.is_empty()
    }

    #[inline]
    pub(crate) fn database(&self) -> Arc<fontdb::Database> {
        Arc::clone(&self.database)
    }
}

impl std::fmt::Debug for FontSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontSelection")
            .field("faces", &self.database.len())
            .field("family", &self.family)
            .finish()
    }
}
