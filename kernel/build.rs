//! 构建脚本
//!
//! 这个脚本在编译前运行，负责：
//! 1. 解析 Kernel.toml 配置文件（或 build/.config）
//! 2. 生成 src/config.rs 配置常量

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::PathBuf;

/// 解析 build/.config 文件（简单 key=value 格式）
///
/// 键名格式为 `section_key`，按第一个下划线拆分
fn parse_dot_config(content: &str) -> toml::Value {
    let mut sections: HashMap<String, HashMap<String, toml::Value>> = HashMap::new();

    for line in content.lines() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(eq_pos) = line.find('=') {
            let key = &line[..eq_pos];
            let value = line[eq_pos + 1..].trim();

            if let Some(underscore_pos) = key.find('_') {
                let section = &key[..underscore_pos];
                let config_key = &key[underscore_pos + 1..];

                let parsed_value = if value == "true" {
                    toml::Value::Boolean(true)
                } else if value == "false" {
                    toml::Value::Boolean(false)
                } else if let Ok(int_val) = value.parse::<i64>() {
                    toml::Value::Integer(int_val)
                } else if value.starts_with('[') && value.ends_with(']') {
                    let items = value[1..value.len() - 1]
                        .split(',')
                        .filter_map(|s| s.trim().parse::<i64>().ok())
                        .map(toml::Value::Integer)
                        .collect();
                    toml::Value::Array(items)
                } else {
                    toml::Value::String(value.trim_matches('"').to_string())
                };

                sections
                    .entry(section.to_string())
                    .or_default()
                    .insert(config_key.to_string(), parsed_value);
            }
        }
    }

    let mut root_map = toml::map::Map::new();

    let mut general = toml::map::Map::new();
    general.insert("name".to_string(), toml::Value::String("mlfq-kernel".to_string()));
    general.insert("version".to_string(), toml::Value::String("0.1.0".to_string()));
    root_map.insert("general".to_string(), toml::Value::Table(general));

    for (section_name, section_data) in sections {
        let mut toml_map = toml::map::Map::new();
        for (k, v) in section_data {
            toml_map.insert(k, v);
        }
        root_map.insert(section_name, toml::Value::Table(toml_map));
    }

    toml::Value::Table(root_map)
}

fn int_or(config: &toml::Value, section: &str, key: &str, default: i64) -> i64 {
    config
        .get(section)
        .and_then(|s| s.get(key))
        .and_then(|v| v.as_integer())
        .unwrap_or(default)
}

fn main() {
    println!("cargo:rerun-if-changed=../Kernel.toml");
    println!("cargo:rerun-if-changed=../build/.config");

    let config_content = if let Ok(content) = fs::read_to_string("../build/.config") {
        println!("cargo:warning=Using build/.config configuration");
        content
    } else {
        fs::read_to_string("../Kernel.toml").expect("无法读取 Kernel.toml")
    };

    let is_toml = config_content.lines().any(|line| {
        let trimmed = line.trim();
        trimmed.starts_with('[') && trimmed.ends_with(']')
    });

    let config = if is_toml {
        toml::from_str(&config_content).expect("配置文件解析失败")
    } else {
        parse_dot_config(&config_content)
    };

    generate_config_code(&config);
}

fn generate_config_code(config: &toml::Value) {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());

    let kernel_name = config
        .get("general")
        .and_then(|g| g.get("name"))
        .and_then(|v| v.as_str())
        .unwrap_or("mlfq-kernel");

    let kernel_version = config
        .get("general")
        .and_then(|g| g.get("version"))
        .and_then(|v| v.as_str())
        .unwrap_or("0.1.0");

    let max_cpus = int_or(config, "smp", "max_cpus", 8);
    let nproc = int_or(config, "process", "nproc", 64);
    let nofile = int_or(config, "process", "nofile", 16);
    let page_size = int_or(config, "memory", "page_size", 4096);
    let aging = int_or(config, "scheduler", "aging_threshold", 250);

    assert!(max_cpus > 0, "smp.max_cpus 必须大于 0");
    assert!(nproc > 1, "process.nproc 至少为 2");
    assert!(
        page_size > 0 && (page_size & (page_size - 1)) == 0,
        "memory.page_size 必须是 2 的幂"
    );

    let slices: Vec<i64> = config
        .get("scheduler")
        .and_then(|s| s.get("time_slices"))
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_integer()).collect())
        .unwrap_or_else(|| vec![10, 20, 40, 80]);
    assert!(
        slices.len() == 4 && slices.iter().all(|&s| s > 0),
        "scheduler.time_slices 必须是 4 个正整数"
    );

    let dispatch = config
        .get("scheduler")
        .and_then(|s| s.get("dispatch"))
        .and_then(|v| v.as_str())
        .unwrap_or("priority");
    assert!(
        dispatch == "priority" || dispatch == "flat",
        "scheduler.dispatch 只能是 \"priority\" 或 \"flat\""
    );

    let config_header = format!(
        r#"//! 内核配置（自动生成）
//!
//! 此文件由 build.rs 根据 Kernel.toml 自动生成，请勿手动修改

// ============================================================
// 基本信息
// ============================================================

/// 内核名称
pub const KERNEL_NAME: &str = "{}";

/// 内核版本
pub const KERNEL_VERSION: &str = "{}";

// ============================================================
// SMP 配置
// ============================================================

/// 最大CPU数量
pub const MAX_CPUS: usize = {};

// ============================================================
// 进程配置
// ============================================================

/// 进程表槽位数
pub const NPROC: usize = {};

/// 每个进程的打开文件数
pub const NOFILE: usize = {};

// ============================================================
// 内存配置
// ============================================================

/// 页大小
pub const PAGE_SIZE: usize = {};

// ============================================================
// 调度器配置
// ============================================================

/// 各级队列时间片 (tick)
pub const TIME_SLICES: [u64; 4] = [{}, {}, {}, {}];

/// 老化阈值 (tick)
pub const AGING_THRESHOLD: u64 = {};

/// 分派策略
pub const SCHED_DISPATCH: &str = "{}";
"#,
        kernel_name,
        kernel_version,
        max_cpus,
        nproc,
        nofile,
        page_size,
        slices[0],
        slices[1],
        slices[2],
        slices[3],
        aging,
        dispatch,
    );

    let config_file = manifest_dir.join("src").join("config.rs");

    // 只有内容变化时才写入，避免每次编译都更新文件时间戳
    let existing_content = fs::read_to_string(&config_file).unwrap_or_default();
    if existing_content != config_header {
        fs::write(&config_file, &config_header).expect("写入配置文件失败");
    }
}
