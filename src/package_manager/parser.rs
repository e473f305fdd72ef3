//! 输出解析函数

use super::types::{FileSubject, InstalledSubject};
use crate::error::QueryError;
use std::path::Path;

/// rpm -qp 查询格式中使用的字段分隔符
pub const FIELD_DELIMITER: &str = "|~|";

/// rpm -qp 单条记录的字段数
pub const FILE_RECORD_FIELDS: usize = 6;

/// 清理终端输出中的 ANSI 转义序列和特殊字符
pub fn clean_terminal_output(input: &str) -> String {
    let mut result = String::new();
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\x1b' => {
                if chars.peek() == Some(&'[') {
                    chars.next();
                    while let Some(&next) = chars.peek() {
                        chars.next();
                        if next.is_ascii_alphabetic() {
                            break;
                        }
                    }
                }
            }
            c if c.is_control() && c != '\t' => {}
            _ => result.push(c),
        }
    }

    result
}

/// 解析 rpm -qa 输出为包名列表，保持后端给出的顺序
pub fn parse_name_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.to_string())
        .collect()
}

/// 取第一个以 `key` 开头的行冒号后的值
fn first_field<'a>(raw: &'a str, key: &str) -> Option<&'a str> {
    raw.lines()
        .filter(|line| line.starts_with(key))
        .find_map(|line| line.split_once(':').map(|(_, value)| value.trim()))
}

/// 解析 rpm -qi 的详情输出
pub fn parse_installed_info(name: &str, raw: &str) -> InstalledSubject {
    InstalledSubject {
        name: first_field(raw, "Name")
            .filter(|n| !n.is_empty())
            .unwrap_or(name)
            .to_string(),
        version: first_field(raw, "Version").unwrap_or_default().to_string(),
        summary: first_field(raw, "Summary").unwrap_or_default().to_string(),
        raw_info: raw.to_string(),
    }
}

/// 解析 rpm -qp 的单条分隔记录
///
/// 字段顺序: 名称、版本、发布号、摘要、描述、架构。
/// 描述中若包含分隔符，多出的字段会合并回描述。
pub fn parse_file_record(path: &Path, record: &str) -> Result<FileSubject, QueryError> {
    let record = record.trim_end_matches(['\n', '\r']);
    let fields: Vec<&str> = record.split(FIELD_DELIMITER).collect();
    if fields.len() < FILE_RECORD_FIELDS {
        return Err(QueryError::Parse {
            expected: FILE_RECORD_FIELDS,
            found: fields.len(),
        });
    }

    let last = fields.len() - 1;
    let name = fields[0].trim();
    if name.is_empty() {
        return Err(QueryError::Parse {
            expected: FILE_RECORD_FIELDS,
            found: fields.len(),
        });
    }

    Ok(FileSubject {
        path: path.to_path_buf(),
        resolved_name: name.to_string(),
        version: fields[1].trim().to_string(),
        release: fields[2].trim().to_string(),
        summary: fields[3].trim().to_string(),
        description: fields[4..last].join(FIELD_DELIMITER).trim().to_string(),
        arch: fields[last].trim().to_string(),
        installed_elsewhere: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const QI_OUTPUT: &str = "Name        : vlc\n\
Epoch       : 1\n\
Version     : 3.0.20\n\
Release     : 1.fc39\n\
Architecture: x86_64\n\
Summary     : The cross-platform open-source multimedia framework\n\
Description :\n\
Summary of the player: not a field\n";

    #[test]
    fn installed_info_takes_first_occurrence() {
        let subject = parse_installed_info("vlc", QI_OUTPUT);
        assert_eq!(subject.name, "vlc");
        assert_eq!(subject.version, "3.0.20");
        assert_eq!(
            subject.summary,
            "The cross-platform open-source multimedia framework"
        );
        assert_eq!(subject.raw_info, QI_OUTPUT);
    }

    #[test]
    fn installed_info_ignores_indented_keys() {
        let raw = "Name    : foo\n  Version : 9.9\nVersion : 1.0\n";
        let subject = parse_installed_info("foo", raw);
        assert_eq!(subject.version, "1.0");
        assert_eq!(subject.summary, "");
    }

    #[test]
    fn installed_info_falls_back_to_queried_name() {
        let subject = parse_installed_info("bar", "Version : 2\n");
        assert_eq!(subject.name, "bar");
    }

    #[test]
    fn file_record_with_six_fields() {
        let record = "htop|~|3.3.0|~|1.fc40|~|Interactive process viewer|~|htop is an interactive text-mode process viewer.|~|x86_64";
        let subject = parse_file_record(Path::new("/tmp/htop.rpm"), record).unwrap();
        assert_eq!(subject.resolved_name, "htop");
        assert_eq!(subject.version, "3.3.0");
        assert_eq!(subject.release, "1.fc40");
        assert_eq!(subject.summary, "Interactive process viewer");
        assert_eq!(subject.arch, "x86_64");
        assert!(!subject.installed_elsewhere);
    }

    #[test]
    fn file_record_with_fewer_fields_is_parse_error() {
        for record in ["", "htop", "htop|~|3.3.0|~|1|~|sum|~|desc"] {
            let err = parse_file_record(Path::new("x.rpm"), record).unwrap_err();
            assert!(matches!(err, QueryError::Parse { expected: 6, .. }), "{record}");
        }
    }

    #[test]
    fn delimiter_inside_description_is_kept() {
        let record = "a|~|1|~|2|~|sum|~|left|~|right|~|noarch";
        let subject = parse_file_record(Path::new("a.rpm"), record).unwrap();
        assert_eq!(subject.description, "left|~|right");
        assert_eq!(subject.arch, "noarch");
    }

    #[test]
    fn name_list_keeps_backend_order() {
        let names = parse_name_list("vlc\nfirefox\n\n  bash \n");
        assert_eq!(names, vec!["vlc", "firefox", "bash"]);
    }

    #[test]
    fn clean_strips_escape_sequences() {
        assert_eq!(clean_terminal_output("\x1b[1mBold\x1b[0m text"), "Bold text");
    }
}
