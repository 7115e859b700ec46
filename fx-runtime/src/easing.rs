//! # Easing 模块
//!
//! 缓动曲线。名称沿用常见的补间库写法（`power2.inOut`、`expo.out` 等），
//! 可以直接从字符串解析。

use std::f32::consts::PI;
use std::str::FromStr;

/// 缓动方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EaseDirection {
    In,
    Out,
    InOut,
}

/// 缓动函数
///
/// `Power(n, dir)` 中 `n` 对应 `powerN`：`power1` 为二次，`power2` 为三次，依此类推。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EasingFunction {
    /// 线性（匀速）
    Linear,
    /// 多项式缓动
    Power(u8, EaseDirection),
    /// 正弦缓动
    Sine(EaseDirection),
    /// 指数缓动
    Expo(EaseDirection),
    /// 回弹缓出（超出目标后回落）
    BackOut,
    /// 弹性缓出
    ElasticOut,
    /// 弹跳缓出
    BounceOut,
}

impl Default for EasingFunction {
    fn default() -> Self {
        Self::Power(1, EaseDirection::Out)
    }
}

impl EasingFunction {
    pub const fn power1_in_out() -> Self {
        Self::Power(1, EaseDirection::InOut)
    }

    pub const fn power2_in_out() -> Self {
        Self::Power(2, EaseDirection::InOut)
    }

    pub const fn power3_out() -> Self {
        Self::Power(3, EaseDirection::Out)
    }

    pub const fn sine_in_out() -> Self {
        Self::Sine(EaseDirection::InOut)
    }

    pub const fn expo_in() -> Self {
        Self::Expo(EaseDirection::In)
    }

    /// 计算缓动值
    ///
    /// `t` 会被限制在 0.0 - 1.0。除 `BackOut` / `ElasticOut` 外，返回值也在该区间。
    pub fn apply(&self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);

        match *self {
            EasingFunction::Linear => t,
            EasingFunction::Power(n, dir) => power(t, i32::from(n) + 1, dir),
            EasingFunction::Sine(dir) => match dir {
                EaseDirection::In => 1.0 - (t * PI / 2.0).cos(),
                EaseDirection::Out => (t * PI / 2.0).sin(),
                EaseDirection::InOut => -((PI * t).cos() - 1.0) / 2.0,
            },
            EasingFunction::Expo(dir) => expo(t, dir),
            EasingFunction::BackOut => back_out(t),
            EasingFunction::ElasticOut => elastic_out(t),
            EasingFunction::BounceOut => bounce_out(t),
        }
    }
}

fn power(t: f32, exp: i32, dir: EaseDirection) -> f32 {
    match dir {
        EaseDirection::In => t.powi(exp),
        EaseDirection::Out => 1.0 - (1.0 - t).powi(exp),
        EaseDirection::InOut => {
            if t < 0.5 {
                2f32.powi(exp - 1) * t.powi(exp)
            } else {
                1.0 - (-2.0 * t + 2.0).powi(exp) / 2.0
            }
        }
    }
}

fn expo(t: f32, dir: EaseDirection) -> f32 {
    if t == 0.0 || t == 1.0 {
        return t;
    }
    match dir {
        EaseDirection::In => 2f32.powf(10.0 * t - 10.0),
        EaseDirection::Out => 1.0 - 2f32.powf(-10.0 * t),
        EaseDirection::InOut => {
            if t < 0.5 {
                2f32.powf(20.0 * t - 10.0) / 2.0
            } else {
                (2.0 - 2f32.powf(-20.0 * t + 10.0)) / 2.0
            }
        }
    }
}

fn back_out(t: f32) -> f32 {
    let c1 = 1.70158;
    let c3 = c1 + 1.0;
    1.0 + c3 * (t - 1.0).powi(3) + c1 * (t - 1.0).powi(2)
}

fn elastic_out(t: f32) -> f32 {
    if t == 0.0 || t == 1.0 {
        return t;
    }
    let c4 = (2.0 * PI) / 3.0;
    2f32.powf(-10.0 * t) * ((t * 10.0 - 0.75) * c4).sin() + 1.0
}

fn bounce_out(t: f32) -> f32 {
    let n1 = 7.5625;
    let d1 = 2.75;

    if t < 1.0 / d1 {
        n1 * t * t
    } else if t < 2.0 / d1 {
        let t = t - 1.5 / d1;
        n1 * t * t + 0.75
    } else if t < 2.5 / d1 {
        let t = t - 2.25 / d1;
        n1 * t * t + 0.9375
    } else {
        let t = t - 2.625 / d1;
        n1 * t * t + 0.984375
    }
}

/// 无法识别的缓动名称
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("未知的缓动名称: '{0}'")]
pub struct UnknownEasing(pub String);

impl FromStr for EasingFunction {
    type Err = UnknownEasing;

    /// 解析 `family.direction` 形式的名称，方向缺省为 `out`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || UnknownEasing(s.to_string());
        let lower = s.trim().to_ascii_lowercase();
        let (family, dir) = match lower.split_once('.') {
            Some((family, dir)) => (family, dir),
            None => (lower.as_str(), "out"),
        };
        let dir = match dir {
            "in" => EaseDirection::In,
            "out" => EaseDirection::Out,
            "inout" => EaseDirection::InOut,
            _ => return Err(unknown()),
        };

        match family {
            "none" | "linear" => Ok(Self::Linear),
            "power1" | "quad" => Ok(Self::Power(1, dir)),
            "power2" | "cubic" => Ok(Self::Power(2, dir)),
            "power3" | "quart" => Ok(Self::Power(3, dir)),
            "power4" | "quint" => Ok(Self::Power(4, dir)),
            "sine" => Ok(Self::Sine(dir)),
            "expo" => Ok(Self::Expo(dir)),
            "back" if dir == EaseDirection::Out => Ok(Self::BackOut),
            "elastic" if dir == EaseDirection::Out => Ok(Self::ElasticOut),
            "bounce" if dir == EaseDirection::Out => Ok(Self::BounceOut),
            _ => Err(unknown()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: &[EasingFunction] = &[
        EasingFunction::Linear,
        EasingFunction::Power(1, EaseDirection::In),
        EasingFunction::Power(2, EaseDirection::Out),
        EasingFunction::Power(3, EaseDirection::InOut),
        EasingFunction::Sine(EaseDirection::InOut),
        EasingFunction::Expo(EaseDirection::In),
        EasingFunction::Expo(EaseDirection::InOut),
        EasingFunction::BackOut,
        EasingFunction::ElasticOut,
        EasingFunction::BounceOut,
    ];

    #[test]
    fn test_endpoints() {
        for easing in ALL {
            assert!(easing.apply(0.0).abs() < 1e-3, "{easing:?} at 0");
            assert!((easing.apply(1.0) - 1.0).abs() < 1e-3, "{easing:?} at 1");
        }
    }

    #[test]
    fn test_in_out_midpoint() {
        let mid = EasingFunction::power2_in_out().apply(0.5);
        assert!((mid - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_clamp() {
        let easing = EasingFunction::Linear;
        assert_eq!(easing.apply(-0.5), 0.0);
        assert_eq!(easing.apply(1.5), 1.0);
    }

    #[test]
    fn test_back_out_overshoots() {
        let peak = (1..100)
            .map(|i| EasingFunction::BackOut.apply(i as f32 / 100.0))
            .fold(0.0f32, f32::max);
        assert!(peak > 1.0);
    }

    #[test]
    fn test_parse_names() {
        assert_eq!(
            "power2.inOut".parse::<EasingFunction>(),
            Ok(EasingFunction::power2_in_out())
        );
        assert_eq!(
            "expo.out".parse::<EasingFunction>(),
            Ok(EasingFunction::Expo(EaseDirection::Out))
        );
        assert_eq!("none".parse::<EasingFunction>(), Ok(EasingFunction::Linear));
        assert_eq!(
            "sine".parse::<EasingFunction>(),
            Ok(EasingFunction::Sine(EaseDirection::Out))
        );
    }

    #[test]
    fn test_named_constructors_match_parsed_names() {
        assert_eq!("sine.inOut".parse::<EasingFunction>(), Ok(EasingFunction::sine_in_out()));
        assert_eq!("expo.in".parse::<EasingFunction>(), Ok(EasingFunction::expo_in()));
        assert_eq!("power3.out".parse::<EasingFunction>(), Ok(EasingFunction::power3_out()));

        // expo.in 起步缓慢
        assert!(EasingFunction::expo_in().apply(0.5) < 0.05);
        assert!((EasingFunction::sine_in_out().apply(0.5) - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_parse_unknown() {
        assert!("wobble.out".parse::<EasingFunction>().is_err());
        assert!("bounce.in".parse::<EasingFunction>().is_err());
        assert!("power2.sideways".parse::<EasingFunction>().is_err());
    }
}
