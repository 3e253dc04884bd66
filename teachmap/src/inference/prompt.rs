//! Prompt generation for field inference
//!
//! Builds one JSON-mode request asking for several fields of one teacher at
//! a time, each with its own formatting instructions.

use crate::models::Field;

use super::InferenceContext;

/// Longest context value sent verbatim.
const MAX_CONTEXT_VALUE_CHARS: usize = 1000;

/// Generate the system prompt.
pub fn system_prompt() -> &'static str {
    "You are a data enrichment assistant for teacher profiles. \
     You fill in missing profile fields from the information given. \
     You answer with a single JSON object whose keys are exactly the requested field names. \
     When a value cannot be determined, answer \"Unknown\" for that field rather than guessing wildly."
}

/// Formatting rules for one field.
pub fn field_instruction(field: Field) -> &'static str {
    match field {
        Field::Name => "Full name, at least two words (e.g. 'Jane Doe').",
        Field::Subject => {
            "Main subject(s) taught, up to 3, comma-separated (e.g. 'Mathematics, Physics'). \
             Prefer a specific subject over 'General Education'."
        }
        Field::Headline => {
            "Short professional headline of 2 to 7 words (e.g. 'Experienced IB Chemistry Educator'). \
             Not just 'Teacher'."
        }
        Field::Bio => {
            "Professional summary of 70 to 150 words. Do not mention any person, school, \
             organization, city or region by name; describe skills, curricula and teaching approach only."
        }
        Field::PreferredCurriculumExperience => {
            "Comma-separated curricula chosen only from: British, American, IB, Indian, CBSE, ICSE, UAE."
        }
        Field::YearsOfTeachingExperience => "Total years of teaching experience as a single integer (e.g. 7).",
        Field::CurrentLocationCountry => "Country of residence in full (e.g. 'United Arab Emirates').",
        Field::CurrentLocationCity => "City of residence (e.g. 'Dubai').",
        Field::LinkedinProfileUrl => {
            "LinkedIn profile URL only, no extra text (e.g. 'https://linkedin.com/in/jane-doe'). \
             Use a URL present in the data when there is one."
        }
        Field::PreferredGradeLevel => {
            "Comma-separated grade levels or ranges, e.g. 'KG', 'Elementary', 'Middle School', \
             'High School', 'Grade 6-10', 'Year 7-9', 'FS1', 'Primary', 'Secondary'."
        }
        Field::Nationality => {
            "Nationality as a demonym (e.g. 'Irish', 'Indian'). Use a regional term such as \
             'European' when only the region can be told."
        }
        Field::CurrentSchool | Field::SchoolWebsite | Field::Email => {
            "Only if stated explicitly in the data; otherwise 'Unknown'. Never invent it."
        }
        Field::ProfileCompletionPercentage => "A number between 0 and 100.",
        Field::HourlyRate | Field::MonthlySalaryExpectation => "A single integer amount.",
        Field::AvailableStartDate => "A date formatted YYYY-MM-DD.",
        Field::CvResumeUrl | Field::VideoIntroUrl => "A URL only if present in the data; otherwise 'Unknown'.",
        _ => "A short plain-text value.",
    }
}

/// Build the user message for `fields`.
pub fn user_prompt(fields: &[Field], context: &InferenceContext) -> String {
    let requested = fields
        .iter()
        .map(|f| format!("\"{}\"", f.name()))
        .collect::<Vec<_>>()
        .join(", ");

    let mut prompt = format!(
        "Infer these fields for the teacher below: {}.\n\nTeacher information:\n",
        requested
    );

    if context.is_empty() {
        prompt.push_str("(no information available)\n");
    }
    for (key, value) in context.iter() {
        prompt.push_str(&format!("- {}: {}\n", key, truncate(value)));
    }

    prompt.push_str("\nInstructions per field:\n");
    for field in fields {
        prompt.push_str(&format!("- \"{}\": {}\n", field.name(), field_instruction(*field)));
    }

    prompt.push_str(
        "\nReturn only a JSON object with the requested field names as keys and string values.",
    );
    prompt
}

fn truncate(value: &str) -> String {
    let flat = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= MAX_CONTEXT_VALUE_CHARS {
        flat
    } else {
        let cut: String = flat.chars().take(MAX_CONTEXT_VALUE_CHARS).collect();
        format!("{}...", cut)
    }
}
