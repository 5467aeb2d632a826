use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use peti_config::{AppConfig, ParserConfig};
use peti_io::{DocumentSaver, IoError, ItemDataFacade, ParseOptions};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::report;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Check(Vec<PathBuf>),
    Summary(PathBuf),
    Dump(PathBuf),
    Normalize {
        input: PathBuf,
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("缺少子命令")]
    MissingCommand,
    #[error("未知子命令：{0}")]
    UnknownCommand(String),
    #[error("`{command}` 的参数数量不正确")]
    WrongArgumentCount { command: &'static str },
    #[error(transparent)]
    Io(#[from] IoError),
    #[error("备份 {path:?} 失败: {source}")]
    Backup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("序列化 JSON 失败: {0}")]
    Json(#[from] serde_json::Error),
    #[error("写出结果失败: {0}")]
    Output(#[from] std::io::Error),
    #[error("{failed} 个文件检查未通过")]
    CheckFailed { failed: usize },
}

impl Command {
    pub fn from_args(args: Vec<String>) -> Result<Self, CommandError> {
        let mut args = args.into_iter();
        let name = args.next().ok_or(CommandError::MissingCommand)?;
        let paths: Vec<PathBuf> = args.map(PathBuf::from).collect();
        let command = match name.as_str() {
            "check" if !paths.is_empty() => Command::Check(paths),
            "check" => return Err(CommandError::WrongArgumentCount { command: "check" }),
            "summary" => Command::Summary(single(paths, "summary")?),
            "dump" => Command::Dump(single(paths, "dump")?),
            "normalize" => {
                let mut paths = paths.into_iter();
                match (paths.next(), paths.next(), paths.next()) {
                    (Some(input), output, None) => Command::Normalize { input, output },
                    _ => {
                        return Err(CommandError::WrongArgumentCount {
                            command: "normalize",
                        });
                    }
                }
            }
            other => return Err(CommandError::UnknownCommand(other.to_string())),
        };
        Ok(command)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Check(_) => "check",
            Command::Summary(_) => "summary",
            Command::Dump(_) => "dump",
            Command::Normalize { .. } => "normalize",
        }
    }
}

fn single(paths: Vec<PathBuf>, command: &'static str) -> Result<PathBuf, CommandError> {
    let mut paths = paths.into_iter();
    match (paths.next(), paths.next()) {
        (Some(path), None) => Ok(path),
        _ => Err(CommandError::WrongArgumentCount { command }),
    }
}

pub fn parse_options(config: &ParserConfig) -> ParseOptions {
    ParseOptions {
        allow_escapes: config.allow_escapes,
        legacy_goo_anchor: config.legacy_goo_anchor,
    }
}

pub fn run(command: &Command, config: &AppConfig, out: &mut impl Write) -> Result<(), CommandError> {
    let facade = ItemDataFacade::new().with_options(parse_options(&config.parser));
    match command {
        Command::Check(paths) => check(&facade, paths, out),
        Command::Summary(path) => {
            let doc = facade.load_with_warnings(path)?.document;
            report::write_summary(&doc, out)?;
            Ok(())
        }
        Command::Dump(path) => {
            let doc = facade.load_with_warnings(path)?.document;
            serde_json::to_writer_pretty(&mut *out, &doc)?;
            writeln!(out)?;
            Ok(())
        }
        Command::Normalize { input, output } => {
            let doc = facade.load_with_warnings(input)?.document;
            let target = output.as_deref().unwrap_or(input);
            if config.output.backup_existing && target.exists() {
                backup(target)?;
            }
            facade.save(&doc, target)?;
            info!(input = %input.display(), output = %target.display(), "已规范化物品定义");
            Ok(())
        }
    }
}

fn check(facade: &ItemDataFacade, paths: &[PathBuf], out: &mut impl Write) -> Result<(), CommandError> {
    let mut failed = 0;
    for path in paths {
        match facade.load_with_warnings(path) {
            Ok(parsed) => {
                writeln!(
                    out,
                    "{}: {} 个物品，{} 条警告",
                    path.display(),
                    parsed.document.len(),
                    parsed.warnings.len()
                )?;
                for warning in &parsed.warnings {
                    writeln!(out, "  警告：{warning}")?;
                }
            }
            Err(err) => {
                error!(path = %path.display(), error = %err, "检查失败");
                writeln!(out, "{}: 错误：{err}", path.display())?;
                failed += 1;
            }
        }
    }
    if failed > 0 {
        Err(CommandError::CheckFailed { failed })
    } else {
        Ok(())
    }
}

/// 复制为同目录下的 `<name>.bak`。
fn backup(path: &Path) -> Result<PathBuf, CommandError> {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".bak");
    let backup_path = path.with_file_name(name);
    fs::copy(path, &backup_path).map_err(|source| CommandError::Backup {
        path: backup_path.clone(),
        source,
    })?;
    warn!(path = %backup_path.display(), "已备份原文件");
    Ok(backup_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#""ItemData"
{
    "Item"
    {
        "Type" "ITEM_TEST"
        "Editor"
        {
            "SubType"
            {
                "Model" { "ModelName" "test.3ds" }
            }
        }
    }
}
"#;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_command_lines() {
        assert_eq!(
            Command::from_args(args(&["check", "a.txt", "b.txt"])).expect("解析参数失败"),
            Command::Check(vec![PathBuf::from("a.txt"), PathBuf::from("b.txt")])
        );
        assert_eq!(
            Command::from_args(args(&["normalize", "in.txt"])).expect("解析参数失败"),
            Command::Normalize {
                input: PathBuf::from("in.txt"),
                output: None
            }
        );
        assert!(matches!(
            Command::from_args(args(&["summary"])),
            Err(CommandError::WrongArgumentCount { command: "summary" })
        ));
        assert!(matches!(
            Command::from_args(args(&["frobnicate"])),
            Err(CommandError::UnknownCommand(_))
        ));
        assert!(matches!(
            Command::from_args(Vec::new()),
            Err(CommandError::MissingCommand)
        ));
    }

    #[test]
    fn parser_config_maps_onto_options() {
        let options = parse_options(&ParserConfig {
            allow_escapes: false,
            legacy_goo_anchor: true,
        });
        assert!(!options.allow_escapes);
        assert!(options.legacy_goo_anchor);
    }

    #[test]
    fn check_reports_failures() {
        let dir = tempfile::tempdir().expect("创建临时目录失败");
        let good = dir.path().join("good.txt");
        let bad = dir.path().join("bad.txt");
        fs::write(&good, SAMPLE).expect("写入测试文件失败");
        fs::write(&bad, "\"ItemData\" {").expect("写入测试文件失败");

        let mut out = Vec::new();
        let config = AppConfig::default();
        run(&Command::Check(vec![good.clone()]), &config, &mut out).expect("检查应通过");
        let err = run(&Command::Check(vec![good, bad]), &config, &mut out).unwrap_err();
        assert!(matches!(err, CommandError::CheckFailed { failed: 1 }));
        let text = String::from_utf8(out).expect("输出应为 UTF-8");
        assert!(text.contains("1 个物品，0 条警告"));
        assert!(text.contains("错误："));
    }

    #[test]
    fn normalize_in_place_keeps_backup() {
        let dir = tempfile::tempdir().expect("创建临时目录失败");
        let path = dir.path().join("editoritems.txt");
        fs::write(&path, SAMPLE).expect("写入测试文件失败");

        let command = Command::Normalize {
            input: path.clone(),
            output: None,
        };
        run(&command, &AppConfig::default(), &mut Vec::new()).expect("规范化失败");

        let backup = fs::read_to_string(dir.path().join("editoritems.txt.bak")).expect("缺少备份");
        assert_eq!(backup, SAMPLE);
        let normalized = fs::read_to_string(&path).expect("读取结果失败");
        assert!(normalized.starts_with("\"ItemData\"\n{\n"));
        assert!(normalized.contains("\"ModelName\" \"test.3ds\""));
    }

    #[test]
    fn normalize_to_new_file_without_backup() {
        let dir = tempfile::tempdir().expect("创建临时目录失败");
        let input = dir.path().join("in.txt");
        let output = dir.path().join("out.txt");
        fs::write(&input, SAMPLE).expect("写入测试文件失败");

        let mut config = AppConfig::default();
        config.output.backup_existing = false;
        let command = Command::Normalize {
            input: input.clone(),
            output: Some(output.clone()),
        };
        run(&command, &config, &mut Vec::new()).expect("规范化失败");
        assert!(output.exists());
        assert!(!dir.path().join("in.txt.bak").exists());
        assert_eq!(fs::read_to_string(&input).expect("读取输入失败"), SAMPLE);
    }

    #[test]
    fn dump_prints_json() {
        let dir = tempfile::tempdir().expect("创建临时目录失败");
        let path = dir.path().join("items.txt");
        fs::write(&path, SAMPLE).expect("写入测试文件失败");

        let mut out = Vec::new();
        run(&Command::Dump(path), &AppConfig::default(), &mut out).expect("导出 JSON 失败");
        let value: serde_json::Value = serde_json::from_slice(&out).expect("输出应为 JSON");
        assert_eq!(value["items"]["item_test"]["id"], "ITEM_TEST");
    }
}
