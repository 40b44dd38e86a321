use serde_json::Value;
use tabled::builder::Builder;
use tabled::settings::Style;

/// Render a response body for the shell. With `table`, a JSON object or array of
/// objects becomes a table whose columns keep the payload's field order; anything
/// else is printed as-is.
pub fn render_body(body: &str, table: bool) -> String {
	if !table {
		return body.to_string();
	}
	match serde_json::from_str::<Value>(body) {
		Ok(Value::Array(rows)) => render_rows(&rows).unwrap_or_else(|| body.to_string()),
		Ok(obj @ Value::Object(_)) => render_rows(std::slice::from_ref(&obj)).unwrap_or_else(|| body.to_string()),
		_ => body.to_string(),
	}
}

fn render_rows(rows: &[Value]) -> Option<String> {
	let mut columns: Vec<String> = Vec::new();
	for row in rows {
		for key in row.as_object()?.keys() {
			if !columns.contains(key) {
				columns.push(key.clone());
			}
		}
	}
	if columns.is_empty() {
		return Some(String::new());
	}

	let mut builder = Builder::default();
	builder.push_record(columns.clone());
	for row in rows {
		let obj = row.as_object()?;
		builder.push_record(columns.iter().map(|col| cell(obj.get(col))));
	}

	let mut table = builder.build();
	table.with(Style::psql());
	Some(table.to_string())
}

fn cell(value: Option<&Value>) -> String {
	match value {
		None | Some(Value::Null) => String::new(),
		Some(Value::String(s)) => s.clone(),
		Some(Value::Array(items)) => items
			.iter()
			.map(|v| cell(Some(v)))
			.collect::<Vec<_>>()
			.join(","),
		Some(other) => other.to_string(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn plain_text_passes_through() {
		assert_eq!(render_body("started a,b", false), "started a,b");
		assert_eq!(render_body("not json", true), "not json");
		assert_eq!(render_body("42", true), "42");
	}

	#[test]
	fn array_of_objects_keeps_field_order() {
		let body = r#"[{"Keeper":"K","Pid":0,"Apps":"a,b"},{"Keeper":"K","Pid":12,"Apps":"c"}]"#;
		let out = render_body(body, true);
		let header = out.lines().next().unwrap();
		let keeper = header.find("Keeper").unwrap();
		let pid = header.find("Pid").unwrap();
		let apps = header.find("Apps").unwrap();
		assert!(keeper < pid && pid < apps);
		assert!(out.contains("12"));
		assert!(out.contains("a,b"));
	}

	#[test]
	fn single_object_is_one_row() {
		let out = render_body(r#"{"executor":"web","done":["a","b"]}"#, true);
		assert!(out.contains("executor"));
		assert!(out.contains("a,b"));
		assert_eq!(out.lines().count(), 3);
	}

	#[test]
	fn array_of_scalars_is_left_alone() {
		assert_eq!(render_body("[1,2]", true), "[1,2]");
	}
}
