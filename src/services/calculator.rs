//! Calculator plugin (`=`)
//!
//! Expressions are evaluated by a throw-away Lua state that only carries the
//! math library. Math functions are also reachable unqualified (`sqrt(2)`).

use mlua::{ Lua, LuaOptions, StdLib, Table, Value };

use crate::config::CALCULATOR_MEMORY_LIMIT;
use crate::plugins::{ Command, Plugin, PluginError, PluginEvent, PluginMetadata, ResultItem };

pub const KEYWORD: &str = "=";
pub const INFO_ID: &str = "calc_info";
pub const ERROR_ID: &str = "calc_error";

pub struct Calculator {
    metadata: PluginMetadata,
}

impl Calculator {
    pub fn new() -> Self {
        Self {
            metadata: PluginMetadata::new("Calculator", KEYWORD)
                .with_description("Evaluate arithmetic expressions")
                .mandatory(),
        }
    }
}

impl Default for Calculator {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for Calculator {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    fn get_results(&mut self, query: &str) -> Result<Vec<ResultItem>, PluginError> {
        let expression = query.trim();
        if expression.is_empty() {
            return Ok(vec![ResultItem::new(
                "Calculator",
                "Enter an expression after '=' (e.g. = 2 * (3 + 4))",
                INFO_ID
            )]);
        }

        let item = match evaluate(expression) {
            Ok(value) => ResultItem::new(value.clone(), format!("Result of: {}", expression), value),
            Err(e) => ResultItem::new(format!("Error: {}", e), "Invalid expression", ERROR_ID),
        };
        Ok(vec![item])
    }

    fn execute(&mut self, identifier: &str) -> Command {
        match identifier {
            INFO_ID | ERROR_ID => Command::None,
            _ => Command::Quit,
        }
    }

    fn update(self: Box<Self>, _event: &PluginEvent) -> (Box<dyn Plugin>, Command) {
        (self, Command::None)
    }
}

/// Evaluate `expression` and render the value
pub fn evaluate(expression: &str) -> Result<String, String> {
    if expression
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .any(|word| word == "function")
    {
        return Err("function definitions are not allowed".to_string());
    }

    let lua = Lua::new_with(StdLib::MATH, LuaOptions::default()).map_err(|e| e.to_string())?;
    lua.set_memory_limit(CALCULATOR_MEMORY_LIMIT).map_err(|e| e.to_string())?;
    expose_math(&lua).map_err(|e| e.to_string())?;

    let value: Value = lua
        .load(format!("return ({})", expression))
        .set_name("=expression")
        .eval()
        .map_err(|e| e.to_string())?;

    format_value(&value)
}

fn expose_math(lua: &Lua) -> mlua::Result<()> {
    let globals = lua.globals();
    let math: Table = globals.get("math")?;
    for pair in math.pairs::<String, Value>() {
        let (name, value) = pair?;
        globals.set(name, value)?;
    }
    Ok(())
}

fn format_value(value: &Value) -> Result<String, String> {
    match value {
        Value::Integer(n) => Ok(n.to_string()),
        Value::Number(n) => Ok(format_number(*n)),
        Value::Boolean(b) => Ok(b.to_string()),
        other => Err(format!("expression produced a {}, not a number", other.type_name())),
    }
}

/// Integral floats print without a fraction
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < (i64::MAX as f64) {
        return (value as i64).to_string();
    }
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic() {
        assert_eq!(evaluate("2 * (3 + 4)").unwrap(), "14");
        assert_eq!(evaluate("10 / 4").unwrap(), "2.5");
        assert_eq!(evaluate("2 ^ 10").unwrap(), "1024");
        assert_eq!(evaluate("7 // 2").unwrap(), "3");
        assert_eq!(evaluate("sqrt(16) + math.abs(-1)").unwrap(), "5");
        assert_eq!(evaluate("1 < 2").unwrap(), "true");
        assert_eq!(evaluate("1 / 0").unwrap(), "inf");
    }

    #[test]
    fn test_errors_become_entries() {
        let mut calculator = Calculator::new();
        let results = calculator.get_results("2 +").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].identifier, ERROR_ID);
        assert!(results[0].title.starts_with("Error: "));

        assert!(evaluate("'text'").is_err());
        assert!(evaluate("(function() while true do end end)()").is_err());
        assert!(evaluate("os.exit()").is_err());
    }

    #[test]
    fn test_info_and_execute() {
        let mut calculator = Calculator::new();
        let info = calculator.get_results("").unwrap();
        assert_eq!(info[0].identifier, INFO_ID);

        assert!(calculator.execute(INFO_ID).is_none());
        assert!(calculator.execute(ERROR_ID).is_none());
        assert!(calculator.execute("42").is_quit());

        let results = calculator.get_results(" 6 * 7 ").unwrap();
        assert_eq!(results[0], ResultItem::new("42", "Result of: 6 * 7", "42"));
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-0.5), "-0.5");
        assert_eq!(format_number(f64::NAN), "NaN");
    }
}
