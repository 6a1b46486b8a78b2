//! 对象名过滤 - 目录/子目录规则 + 文件名匹配

use crate::error::SyncError;
use regex::Regex;

/// 文件名（key 的最后一段）匹配规则，三者只能选其一
#[derive(Debug, Clone, Default)]
pub enum LeafMatcher {
    /// 全部接受
    #[default]
    MatchAll,
    /// 通配符（* 与 ?），不区分大小写
    Wildcard(Regex),
    /// 正则表达式，必须完整匹配文件名
    Pattern(Regex),
}

impl LeafMatcher {
    /// 根据配置选择匹配规则，同时配置通配符和正则视为配置错误
    pub fn from_options(
        wildcard: Option<&str>,
        regex: Option<&str>,
    ) -> Result<Self, SyncError> {
        // 只有空白的配置视为未设置，其余按原样编译
        let wildcard = wildcard.filter(|s| !s.trim().is_empty());
        let regex = regex.filter(|s| !s.trim().is_empty());

        match (wildcard, regex) {
            (Some(_), Some(_)) => Err(SyncError::ConflictingFilters),
            (Some(w), None) => Self::wildcard(w),
            (None, Some(r)) => Self::regex(r),
            (None, None) => Ok(Self::MatchAll),
        }
    }

    /// 通配符转为不区分大小写的完整匹配正则
    pub fn wildcard(pattern: &str) -> Result<Self, SyncError> {
        let mut regex_pattern = String::from("(?i)^");
        for c in pattern.chars() {
            match c {
                '*' => regex_pattern.push_str(".*"),
                '?' => regex_pattern.push('.'),
                other => regex_pattern.push_str(&regex::escape(&other.to_string())),
            }
        }
        regex_pattern.push('$');

        Regex::new(&regex_pattern)
            .map(Self::Wildcard)
            .map_err(|e| SyncError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
    }

    /// 正则需要匹配整个文件名，而不是其中一段
    pub fn regex(pattern: &str) -> Result<Self, SyncError> {
        Regex::new(&format!("^(?:{})$", pattern))
            .map(Self::Pattern)
            .map_err(|e| SyncError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn matches(&self, leaf: &str) -> bool {
        match self {
            LeafMatcher::MatchAll => true,
            LeafMatcher::Wildcard(re) | LeafMatcher::Pattern(re) => re.is_match(leaf),
        }
    }
}

/// 单次同步使用的目录规则
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterPolicy {
    /// 规范化后的目录，None 表示桶根目录
    folder: Option<String>,
    accept_subfolders: bool,
}

impl FilterPolicy {
    pub fn new(folder: Option<&str>, accept_subfolders: bool) -> Self {
        Self {
            folder: normalize_folder(folder),
            accept_subfolders,
        }
    }

    pub fn folder(&self) -> Option<&str> {
        self.folder.as_deref()
    }

    pub fn accept_subfolders(&self) -> bool {
        self.accept_subfolders
    }
}

/// 规范化目录：去空白，"/" 或空视为根目录，补全结尾 /，去掉开头 /
pub fn normalize_folder(folder: Option<&str>) -> Option<String> {
    let folder = folder?.trim();
    if folder.is_empty() || folder == "/" {
        return None;
    }

    let mut folder = folder.to_string();
    if !folder.ends_with('/') {
        folder.push('/');
    }
    if let Some(stripped) = folder.strip_prefix('/') {
        folder = stripped.to_string();
    }
    Some(folder)
}

/// 判断 key 是否需要同步
pub fn accept(key: &str, policy: &FilterPolicy, matcher: &LeafMatcher) -> bool {
    // 以 / 结尾的是目录占位对象
    if key.trim().is_empty() || key.ends_with('/') {
        return false;
    }

    match policy.folder() {
        Some(folder) => {
            let Some(relative) = key.strip_prefix(folder) else {
                return false;
            };
            if relative.is_empty() || (!policy.accept_subfolders && relative.contains('/')) {
                return false;
            }
        }
        None => {
            if !policy.accept_subfolders && key.contains('/') {
                return false;
            }
        }
    }

    let leaf = key.rsplit('/').next().unwrap_or(key);
    matcher.matches(leaf)
}

/// 文件名过滤器：启动时确定的匹配规则 + 是否接受子目录
#[derive(Debug, Clone, Default)]
pub struct NameFilter {
    matcher: LeafMatcher,
    accept_subfolders: bool,
}

impl NameFilter {
    pub fn new(matcher: LeafMatcher, accept_subfolders: bool) -> Self {
        Self {
            matcher,
            accept_subfolders,
        }
    }

    /// 为本次同步的目录生成规则
    pub fn policy(&self, folder: Option<&str>) -> FilterPolicy {
        FilterPolicy::new(folder, self.accept_subfolders)
    }

    pub fn accept(&self, key: &str, policy: &FilterPolicy) -> bool {
        accept(key, policy, &self.matcher)
    }

    pub fn accept_subfolders(&self) -> bool {
        self.accept_subfolders
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_folder() {
        assert_eq!(normalize_folder(None), None);
        assert_eq!(normalize_folder(Some("/")), None);
        assert_eq!(normalize_folder(Some("   ")), None);
        assert_eq!(normalize_folder(Some(" sub ")), Some("sub/".to_string()));
        assert_eq!(normalize_folder(Some("/sub")), Some("sub/".to_string()));
        assert_eq!(normalize_folder(Some("/a/b/")), Some("a/b/".to_string()));
    }

    #[test]
    fn test_directory_markers_never_accepted() {
        for subfolders in [true, false] {
            for folder in [None, Some("sub")] {
                let policy = FilterPolicy::new(folder, subfolders);
                for key in ["dir/", "sub/", "sub/x/", "/"] {
                    assert!(!accept(key, &policy, &LeafMatcher::MatchAll), "{}", key);
                }
            }
        }
    }

    #[test]
    fn test_root_without_subfolders() {
        let policy = FilterPolicy::new(None, false);
        assert!(!accept("a/b.txt", &policy, &LeafMatcher::MatchAll));
        assert!(accept("b.txt", &policy, &LeafMatcher::MatchAll));
        assert!(!accept("", &policy, &LeafMatcher::MatchAll));
        assert!(!accept("  ", &policy, &LeafMatcher::MatchAll));
    }

    #[test]
    fn test_root_with_subfolders() {
        let policy = FilterPolicy::new(Some("/"), true);
        assert!(accept("a/b.txt", &policy, &LeafMatcher::MatchAll));
        assert!(accept("b.txt", &policy, &LeafMatcher::MatchAll));
    }

    #[test]
    fn test_folder_with_and_without_subfolders() {
        let with_sub = FilterPolicy::new(Some("sub/"), true);
        assert!(accept("sub/x/y.txt", &with_sub, &LeafMatcher::MatchAll));
        assert!(accept("sub/y.txt", &with_sub, &LeafMatcher::MatchAll));

        let without_sub = FilterPolicy::new(Some("sub/"), false);
        assert!(!accept("sub/x/y.txt", &without_sub, &LeafMatcher::MatchAll));
        assert!(accept("sub/y.txt", &without_sub, &LeafMatcher::MatchAll));

        // 目录外的文件和目录本身
        assert!(!accept("other/y.txt", &with_sub, &LeafMatcher::MatchAll));
        assert!(!accept("y.txt", &with_sub, &LeafMatcher::MatchAll));
        assert!(!accept("sub", &with_sub, &LeafMatcher::MatchAll));
    }

    #[test]
    fn test_wildcard_ignores_case() {
        let matcher = LeafMatcher::wildcard("*.txt").unwrap();
        let policy = FilterPolicy::new(None, true);
        assert!(accept("Test.TXT", &policy, &matcher));
        assert!(accept("dir/test.txt", &policy, &matcher));
        assert!(!accept("test.txt.bak", &policy, &matcher));

        let single = LeafMatcher::wildcard("file?.log").unwrap();
        assert!(single.matches("file1.log"));
        assert!(!single.matches("file10.log"));
        // . 不是通配符
        assert!(!single.matches("file1xlog"));
    }

    #[test]
    fn test_regex_is_case_sensitive_full_match() {
        let matcher = LeafMatcher::regex(r"[a-z]+\.txt").unwrap();
        let policy = FilterPolicy::new(None, false);
        assert!(!accept("Test.TXT", &policy, &matcher));
        assert!(accept("test.txt", &policy, &matcher));
        // 只匹配其中一段不算
        assert!(!accept("test.txt1", &policy, &matcher));
        assert!(!accept("1test.txt", &policy, &matcher));
    }

    #[test]
    fn test_matcher_selection() {
        assert!(matches!(
            LeafMatcher::from_options(Some("*.txt"), Some(".*")),
            Err(SyncError::ConflictingFilters)
        ));
        assert!(matches!(
            LeafMatcher::from_options(None, None),
            Ok(LeafMatcher::MatchAll)
        ));
        assert!(matches!(
            LeafMatcher::from_options(Some("  "), Some("a+")),
            Ok(LeafMatcher::Pattern(_))
        ));
        assert!(matches!(
            LeafMatcher::from_options(None, Some("(")),
            Err(SyncError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_pattern_whitespace_is_significant() {
        let matcher = LeafMatcher::from_options(None, Some(" a")).unwrap();
        assert!(matcher.matches(" a"));
        assert!(!matcher.matches("a"));

        let wildcard = LeafMatcher::from_options(Some("* copy.txt"), None).unwrap();
        assert!(wildcard.matches("report copy.txt"));
        assert!(!wildcard.matches("reportcopy.txt"));
    }

    #[test]
    fn test_name_filter_policy() {
        let filter = NameFilter::new(LeafMatcher::MatchAll, false);
        let policy = filter.policy(Some("/data"));
        assert_eq!(policy.folder(), Some("data/"));
        assert!(filter.accept("data/a.csv", &policy));
        assert!(!filter.accept("data/2024/a.csv", &policy));
    }
}
