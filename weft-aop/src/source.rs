//! 类来源
//!
//! 提供目标程序的类全集及每个类的结构描述，供预热和按需加载使用。

use crate::class::ClassDescriptor;
use crate::error::{WeaveError, WeaveResult};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// 类来源
pub trait ClassSource: Send + Sync {
    /// 类全集，按名称排序
    fn class_names(&self) -> WeaveResult<Vec<String>>;

    /// 获取类的结构描述
    fn describe(&self, name: &str) -> WeaveResult<ClassDescriptor>;
}

/// 内存中的类来源
#[derive(Debug, Clone, Default)]
pub struct InMemoryClassSource {
    classes: BTreeMap<String, ClassDescriptor>,
}

impl InMemoryClassSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_class(mut self, class: ClassDescriptor) -> Self {
        self.insert(class);
        self
    }

    pub fn insert(&mut self, class: ClassDescriptor) {
        self.classes.insert(class.name.clone(), class);
    }
}

impl FromIterator<ClassDescriptor> for InMemoryClassSource {
    fn from_iter<I: IntoIterator<Item = ClassDescriptor>>(iter: I) -> Self {
        let mut source = Self::new();
        for class in iter {
            source.insert(class);
        }
        source
    }
}

impl ClassSource for InMemoryClassSource {
    fn class_names(&self) -> WeaveResult<Vec<String>> {
        Ok(self.classes.keys().cloned().collect())
    }

    fn describe(&self, name: &str) -> WeaveResult<ClassDescriptor> {
        self.classes
            .get(name)
            .cloned()
            .ok_or_else(|| WeaveError::ClassNotFound(name.to_string()))
    }
}

/// 目录类来源
///
/// 每个 `<Class>.json` 文件保存一个类描述，文件名即类名
#[derive(Debug, Clone)]
pub struct DirectoryClassSource {
    root: PathBuf,
}

impl DirectoryClassSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.json", name))
    }
}

impl ClassSource for DirectoryClassSource {
    fn class_names(&self) -> WeaveResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        tracing::debug!("Found {} class descriptor(s) in {}", names.len(), self.root.display());
        Ok(names)
    }

    fn describe(&self, name: &str) -> WeaveResult<ClassDescriptor> {
        let path = self.path_for(name);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(WeaveError::ClassNotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let class: ClassDescriptor = serde_json::from_str(&content)
            .map_err(|e| WeaveError::weaving(name, format!("malformed descriptor: {}", e)))?;
        if class.name != name {
            return Err(WeaveError::weaving(
                name,
                format!("descriptor declares class '{}'", class.name),
            ));
        }
        Ok(class)
    }
}
