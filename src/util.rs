// 工具函数

/// 格式化文件大小为人类可读格式
///
/// 二进制单位（1024 进制），保留一位小数；小于 1KB 时输出整数字节数。
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

    if bytes < 1024 {
        return format!("{}B", bytes);
    }

    let mut value = bytes as f64;
    let mut idx = 0;
    while value >= 1024.0 && idx < UNITS.len() - 1 {
        value /= 1024.0;
        idx += 1;
    }

    format!("{:.1}{}", value, UNITS[idx])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_human_size_bytes() {
        assert_eq!(human_size(0), "0B");
        assert_eq!(human_size(1), "1B");
        assert_eq!(human_size(1023), "1023B");
    }

    #[test]
    fn test_human_size_units() {
        assert_eq!(human_size(1024), "1.0KB");
        assert_eq!(human_size(1536), "1.5KB");
        assert_eq!(human_size(1024 * 1024), "1.0MB");
        assert_eq!(human_size(8 * 1024 * 1024), "8.0MB");
        assert_eq!(human_size(3 * 1024 * 1024 * 1024), "3.0GB");
    }

    proptest! {
        /// 1KB 以上时数值部分应落在 [1.0, 1024.0) 区间
        #[test]
        fn prop_mantissa_in_range(bytes in 1024u64..(1u64 << 60)) {
            let formatted = human_size(bytes);
            let unit_start = formatted
                .find(|c: char| c.is_ascii_alphabetic())
                .unwrap();
            let value: f64 = formatted[..unit_start].parse().unwrap();
            prop_assert!(value >= 1.0);
            prop_assert!(value < 1024.5, "rounding may push to 1024.0: {}", formatted);
        }
    }
}
