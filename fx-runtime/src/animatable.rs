//! # Animatable 模块
//!
//! 可补间对象的接口定义。
//!
//! 补间只关心 f32 属性值随时间的变化，不假设对象类型：
//! 对象通过 [`Animatable`] 声明自己有哪些属性可以被补间，并自行决定如何使用这些值。

use std::cell::RefCell;

/// 可补间对象接口
///
/// 方法接收 `&self`，实现方使用 `RefCell`/`Cell` 提供内部可变性，
/// 这样同一个对象可以同时被多个补间和效果共享。
///
/// ## 实现示例
///
/// ```rust,ignore
/// struct Glow {
///     intensity: Cell<f32>,
/// }
///
/// impl Animatable for Glow {
///     fn get_property(&self, property: &str) -> Option<f32> {
///         match property {
///             "intensity" => Some(self.intensity.get()),
///             _ => None,
///         }
///     }
///
///     fn set_property(&self, property: &str, value: f32) -> bool {
///         match property {
///             "intensity" => { self.intensity.set(value); true }
///             _ => false,
///         }
///     }
///
///     fn property_list(&self) -> &[&'static str] {
///         &["intensity"]
///     }
/// }
/// ```
pub trait Animatable: 'static {
    /// 获取属性的当前值，属性不存在时返回 `None`
    fn get_property(&self, property: &str) -> Option<f32>;

    /// 设置属性的新值，属性不存在时返回 `false`
    fn set_property(&self, property: &str, value: f32) -> bool;

    /// 所有可补间属性的列表（用于调试和校验）
    fn property_list(&self) -> &[&'static str];
}

/// 具名 f32 属性集合
///
/// 效果内部的缩放/透明度/强度等数值都放在这里，由补间直接驱动。
#[derive(Debug)]
pub struct PropertyBag {
    names: Vec<&'static str>,
    values: RefCell<Vec<f32>>,
}

impl PropertyBag {
    /// 使用初始值创建属性集合
    pub fn new(initial: &[(&'static str, f32)]) -> Self {
        Self {
            names: initial.iter().map(|(name, _)| *name).collect(),
            values: RefCell::new(initial.iter().map(|(_, v)| *v).collect()),
        }
    }

    fn index(&self, property: &str) -> Option<usize> {
        self.names.iter().position(|n| *n == property)
    }

    /// 读取属性，不存在时返回默认值
    pub fn get_or(&self, property: &str, default: f32) -> f32 {
        self.get_property(property).unwrap_or(default)
    }

    /// 当前值快照
    pub fn snapshot(&self) -> Vec<(&'static str, f32)> {
        self.names
            .iter()
            .copied()
            .zip(self.values.borrow().iter().copied())
            .collect()
    }
}

impl Animatable for PropertyBag {
    fn get_property(&self, property: &str) -> Option<f32> {
        let index = self.index(property)?;
        self.values.borrow().get(index).copied()
    }

    fn set_property(&self, property: &str, value: f32) -> bool {
        match self.index(property) {
            Some(index) => {
                self.values.borrow_mut()[index] = value;
                true
            }
            None => false,
        }
    }

    fn property_list(&self) -> &[&'static str] {
        &self.names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_bag() {
        let bag = PropertyBag::new(&[("scale", 0.0), ("opacity", 1.0)]);

        assert_eq!(bag.get_property("scale"), Some(0.0));
        assert_eq!(bag.get_property("unknown"), None);

        assert!(bag.set_property("scale", 2.5));
        assert_eq!(bag.get_or("scale", 0.0), 2.5);

        assert!(!bag.set_property("unknown", 1.0));
        assert_eq!(bag.get_or("unknown", 7.0), 7.0);

        assert_eq!(bag.property_list(), &["scale", "opacity"]);
        assert_eq!(bag.snapshot(), vec![("scale", 2.5), ("opacity", 1.0)]);
    }
}
