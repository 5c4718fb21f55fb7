//! 脚本引擎配置
//! Script engine configuration

use serde::{Deserialize, Serialize};

/// 脚本引擎限制配置
/// Limits applied to the underlying Rhai engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 最大调用栈深度
    /// Maximum function call nesting
    pub max_call_levels: usize,
    /// 最大运算次数，0 表示不限制
    /// Maximum number of operations per run, 0 means unlimited
    pub max_operations: u64,
    /// 最大表达式深度
    /// Maximum expression nesting at global level
    pub max_expr_depth: usize,
    /// 函数体内最大表达式深度
    /// Maximum expression nesting inside function bodies
    pub max_function_expr_depth: usize,
    /// 是否要求变量在使用前声明
    /// Reject scripts that reference undeclared variables
    pub strict_variables: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_call_levels: 64,
            max_operations: 0,
            max_expr_depth: 64,
            max_function_expr_depth: 32,
            strict_variables: false,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_call_levels(mut self, levels: usize) -> Self {
        self.max_call_levels = levels;
        self
    }

    pub fn with_max_operations(mut self, operations: u64) -> Self {
        self.max_operations = operations;
        self
    }

    pub fn with_max_expr_depths(mut self, global: usize, function: usize) -> Self {
        self.max_expr_depth = global;
        self.max_function_expr_depth = function;
        self
    }

    pub fn with_strict_variables(mut self, strict: bool) -> Self {
        self.strict_variables = strict;
        self
    }
}
