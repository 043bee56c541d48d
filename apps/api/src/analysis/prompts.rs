// LLM prompt for the improvement report.
// The resume summary and job description are embedded verbatim.

/// Builds the career-coach prompt requesting the four-section report.
pub fn feedback_prompt(resume_text: &str, job_text: &str) -> String {
    format!(
        r#"
You are an expert career coach. Compare the given resume and job description and provide detailed insights.

Output format:
- JOB MATCH SCORE: ...
- MISSING SKILLS: ...
- RECOMMENDATIONS FOR IMPROVING OR CREATING NEW RESUME: ...
- SUMMARY: ...

Resume:
{resume_text}

Job Description:
{job_text}
"#
    )
}
