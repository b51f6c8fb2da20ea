//! Prompt templates for the insurance query workflow

use serde_json::{Map, Value};

/// Rows of sample data included in the answer prompt
pub const ANSWER_SAMPLE_ROWS: usize = 3;

const FIELD_LIST: &str = "\
- policy_number (TEXT): Unique policy identifier
- insured_name (TEXT): Name of insured party
- sum_insured (REAL): Total coverage amount
- premium (REAL): Annual premium amount
- own_retention_ppn (REAL): Own retention percentage (0-100)
- own_retention_sum_insured (REAL): Own retention amount
- own_retention_premium (REAL): Own retention premium
- treaty_ppn (REAL): Treaty percentage (0-100)
- treaty_sum_insured (REAL): Treaty coverage amount
- treaty_premium (REAL): Treaty premium
- insurance_period_start_date (TEXT, YYYY-MM-DD): Coverage start date
- insurance_period_end_date (TEXT, YYYY-MM-DD): Coverage end date";

const SCHEMA_DDL: &str = "\
CREATE TABLE insurance_policies (
    guid TEXT PRIMARY KEY,
    policy_number TEXT UNIQUE NOT NULL,
    insured_name TEXT NOT NULL,
    sum_insured REAL NOT NULL,
    premium REAL NOT NULL,
    own_retention_ppn REAL NOT NULL,
    own_retention_sum_insured REAL NOT NULL,
    own_retention_premium REAL NOT NULL,
    treaty_ppn REAL NOT NULL,
    treaty_sum_insured REAL NOT NULL,
    treaty_premium REAL NOT NULL,
    insurance_period_start_date TEXT NOT NULL, -- ISO date YYYY-MM-DD
    insurance_period_end_date TEXT NOT NULL,   -- ISO date YYYY-MM-DD
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);";

/// Classify a question and extract entities, answered as JSON
pub fn query_analysis_prompt(question: &str) -> String {
    format!(
        r#"You are an expert insurance data analyst. Analyze this insurance-related query to determine the best data processing approach.

Query: "{question}"

Classify the query and extract key information that will help generate accurate SQL against an insurance policy database.

The database contains insurance policies with these fields:
{fields}

Respond in JSON format:
{{
    "query_type": "simple_lookup|aggregation|comparison|date_analysis|complex_analysis",
    "intent": "Brief description of what user wants to know",
    "entities": {{
        "policy_numbers": [],
        "insured_names": [],
        "amounts": [],
        "date_ranges": [],
        "percentages": []
    }},
    "sql_strategy": {{
        "target_fields": [],
        "aggregations": [],
        "filters": [],
        "grouping": [],
        "sorting": []
    }},
    "complexity_level": "low|medium|high"
}}"#,
        question = question,
        fields = FIELD_LIST,
    )
}

/// Produce one read-only SQLite statement for the question
pub fn sql_generation_prompt(question: &str, analysis: &Value, max_results: u32) -> String {
    let analysis_text =
        serde_json::to_string_pretty(analysis).unwrap_or_else(|_| "{}".to_string());

    format!(
        r#"You are an expert SQLite developer specializing in insurance data queries. Generate a safe, efficient SQL query.

Original Question: "{question}"

Query Analysis:
{analysis}

Database Schema:
```sql
{schema}
```

Generate a SQLite query that:
1. Accurately answers the user's question
2. Uses SQLite syntax and functions (dates are ISO text; compare with date('now') or string literals 'YYYY-MM-DD')
3. Uses correct aggregation functions (SUM, AVG, COUNT, etc.)
4. Includes a LIMIT clause of at most {max_results} rows unless the result is a single aggregate row
5. Includes policy_number in the selected columns when returning individual policies
6. Uses meaningful column aliases

SAFETY RULES:
- ONLY a single SELECT (or WITH ... SELECT) statement
- NO DROP, DELETE, UPDATE, INSERT, ALTER, PRAGMA or ATTACH

Respond with ONLY the SQL query, no explanations or markdown formatting:"#,
        question = question,
        analysis = analysis_text,
        schema = SCHEMA_DDL,
        max_results = max_results,
    )
}

/// Turn query results into a business-facing answer
pub fn answer_generation_prompt(question: &str, rows: &[Map<String, Value>]) -> String {
    let data_summary = if rows.is_empty() {
        "No data found".to_string()
    } else {
        format!("{} records", rows.len())
    };

    let sample = &rows[..rows.len().min(ANSWER_SAMPLE_ROWS)];
    let sample_data = if sample.is_empty() {
        "No sample data".to_string()
    } else {
        serde_json::to_string_pretty(sample).unwrap_or_else(|_| "[]".to_string())
    };

    format!(
        r#"You are an expert insurance analyst providing insights to business users. Answer based on the data retrieved.

Original Question: "{question}"

Data Retrieved: {summary}
Sample Data:
{sample}

Instructions:
1. Answer the question directly and clearly
2. Include specific numbers, percentages and monetary amounts
3. Mention key policy numbers when several policies are involved
4. If no data was found, say so and suggest how to rephrase
5. Format monetary amounts with thousands separators

Provide a complete, professional response:"#,
        question = question,
        summary = data_summary,
        sample = sample_data,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_analysis_prompt_mentions_question_and_fields() {
        let prompt = query_analysis_prompt("Total premium for Acme?");
        assert!(prompt.contains("Query: \"Total premium for Acme?\""));
        assert!(prompt.contains("treaty_sum_insured"));
        assert!(prompt.contains("\"query_type\""));
    }

    #[test]
    fn test_sql_prompt_includes_analysis_and_schema() {
        let prompt = sql_generation_prompt("q", &json!({"query_type": "aggregation"}), 25);
        assert!(prompt.contains("\"query_type\": \"aggregation\""));
        assert!(prompt.contains("CREATE TABLE insurance_policies"));
        assert!(prompt.contains("at most 25 rows"));
    }

    #[test]
    fn test_answer_prompt_samples_three_rows() {
        let rows: Vec<Map<String, Value>> = (1..=5)
            .map(|i| {
                let mut row = Map::new();
                row.insert("policy_number".to_string(), json!(format!("P{}", i)));
                row
            })
            .collect();
        let prompt = answer_generation_prompt("q", &rows);
        assert!(prompt.contains("Data Retrieved: 5 records"));
        assert!(prompt.contains("P3"));
        assert!(!prompt.contains("P4"));
    }

    #[test]
    fn test_answer_prompt_without_rows() {
        let prompt = answer_generation_prompt("q", &[]);
        assert!(prompt.contains("Data Retrieved: No data found"));
        assert!(prompt.contains("No sample data"));
    }
}
