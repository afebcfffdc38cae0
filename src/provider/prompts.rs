//! Prompt construction for the estimation provider

use super::types::EstimationRequest;
use crate::corpus::Size;

/// Role and response schema; the size guide is appended by [`system_prompt`]
const SYSTEM_PROMPT_HEADER: &str = r#"You are an expert software estimation assistant. Your role is to provide accurate time and effort estimates for software development tasks.

You should:
1. Analyze the task description carefully
2. Consider similar historical tasks if provided
3. Factor in complexity, risks, and dependencies
4. Provide estimates in multiple formats (hours, story points, size)
5. Explain your reasoning clearly
6. Highlight key assumptions and potential risks
7. Be realistic and slightly conservative in estimates

Response Format:
Provide your response as a valid JSON object with this structure:
{
  "estimated_hours": <number greater than 0>,
  "estimated_size": "<XS|S|M|L|XL>",
  "story_points": <number>,
  "confidence_score": <0.0 to 1.0>,
  "reasoning": "<explanation>",
  "assumptions": ["<assumption 1>", "<assumption 2>"],
  "risks": ["<risk 1>", "<risk 2>"],
  "recommended_action": "<optional recommendation>"
}"#;

fn size_description(size: Size) -> &'static str {
    match size {
        Size::Xs => "Trivial changes, small fixes",
        Size::S => "Simple features, minor refactoring",
        Size::M => "Standard features, moderate complexity",
        Size::L => "Complex features, significant refactoring",
        Size::Xl => "Very complex, should be broken down",
    }
}

/// System message: role, response schema, and a size and story-point guide
/// derived from the [`Size`] hour ranges
pub fn system_prompt() -> String {
    let mut prompt = String::from(SYSTEM_PROMPT_HEADER);

    prompt.push_str("\n\nSize Guide:\n");
    for size in Size::ALL {
        let (min, max) = size.hour_range();
        prompt.push_str(&format!(
            "- {} ({}-{} hours, {} story points): {}\n",
            size,
            min,
            max,
            size.story_points(),
            size_description(size)
        ));
    }

    prompt.push_str("\nStory Points Guide (Fibonacci scale):\n");
    let points: Vec<String> = Size::ALL
        .iter()
        .map(|size| format!("{}={}", size, size.story_points()))
        .collect();
    prompt.push_str(&format!("- Typical points per size: {}\n", points.join(", ")));
    prompt.push_str("- Use 3 between S and M, and 21 for work that should be broken down");

    prompt
}

/// Build the user message for one estimation request
pub fn build_estimation_prompt(request: &EstimationRequest) -> String {
    let mut prompt = String::new();

    prompt.push_str("## Task to Estimate\n\n");
    prompt.push_str(&format!("**Title:** {}\n\n", request.task_title));
    if !request.task_description.is_empty() {
        prompt.push_str(&format!("**Description:**\n{}\n\n", request.task_description));
    }

    if !request.context.is_empty() {
        prompt.push_str("## Additional Context\n\n");
        for (key, value) in &request.context {
            prompt.push_str(&format!("- **{}:** {}\n", key, value));
        }
        prompt.push('\n');
    }

    if let Some(stats) = &request.dataset_stats {
        prompt.push_str("## Historical Dataset Overview\n\n");
        prompt.push_str(&format!(
            "- **Total historical tasks:** {} ({} completed)\n",
            stats.total_tasks, stats.closed_tasks
        ));
        if stats.avg_hours > 0.0 {
            prompt.push_str(&format!(
                "- **Average task duration:** {:.1} hours (median: {:.1} hours)\n",
                stats.avg_hours, stats.median_hours
            ));
        }
        if let [p10, p25, p50, p75, p90] = stats.percentile_hours.as_slice() {
            prompt.push_str(&format!(
                "- **Effort percentiles:** 10th={:.1}h, 25th={:.1}h, 50th={:.1}h, 75th={:.1}h, 90th={:.1}h\n",
                p10, p25, p50, p75, p90
            ));
        }

        let sizes: Vec<String> = Size::ALL
            .iter()
            .filter_map(|size| {
                stats
                    .tasks_by_size
                    .get(size)
                    .filter(|count| **count > 0)
                    .map(|count| format!("{}={}", size, count))
            })
            .collect();
        if !sizes.is_empty() {
            prompt.push_str(&format!("- **Size distribution:** {}\n", sizes.join(", ")));
        }

        if !stats.category_breakdown.is_empty() {
            prompt.push_str("\n### Category Breakdown (Effort Patterns)\n\n");
            for (category, cat) in &stats.category_breakdown {
                prompt.push_str(&format!("**{}** ({} tasks):\n", category, cat.count));
                prompt.push_str(&format!("  - Average: {:.1} hours\n", cat.avg_hours));
                prompt.push_str(&format!(
                    "  - Range: {:.1} - {:.1} hours\n",
                    cat.min_hours, cat.max_hours
                ));
                if !cat.task_titles.is_empty() {
                    prompt.push_str(&format!("  - Examples: {}\n", cat.task_titles.join(", ")));
                }
                prompt.push('\n');
            }
        }
        prompt.push('\n');
    }

    if !request.similar_tasks.is_empty() {
        prompt.push_str("## Reference Tasks (Enhanced Dataset)\n\n");
        if let Some(meta) = &request.similarity_context {
            prompt.push_str(&format!(
                "*Dataset includes: {} similar matches ({:.0}% threshold) + stratified samples + percentile samples*\n",
                meta.matches_found,
                meta.threshold_used * 100.0
            ));
            prompt.push_str(&format!(
                "*Highest similarity: {:.0}%*\n\n",
                meta.highest_similarity * 100.0
            ));
        }
        prompt.push_str("Use these tasks as reference for your estimate. Tasks are ordered by relevance:\n\n");

        for (i, task) in request.similar_tasks.iter().enumerate() {
            if task.similarity > 0.0 {
                prompt.push_str(&format!(
                    "### Task {} [Similar: {:.0}% match]\n",
                    i + 1,
                    task.similarity * 100.0
                ));
            } else {
                prompt.push_str(&format!("### Task {} [Sample]\n", i + 1));
            }

            prompt.push_str(&format!("**Title:** {}\n", task.title));
            if !task.description.is_empty() {
                prompt.push_str(&format!("**Description:** {}\n", task.description));
            }
            if task.actual_hours > 0.0 {
                prompt.push_str(&format!("**Actual Time:** {:.1} hours\n", task.actual_hours));
            }
            if let Some(size) = task.estimated_size {
                prompt.push_str(&format!("**Size:** {}\n", size));
            }
            if task.story_points > 0.0 {
                prompt.push_str(&format!("**Story Points:** {:.0}\n", task.story_points));
            }
            if !task.labels.is_empty() {
                prompt.push_str(&format!("**Labels:** {}\n", task.labels.join(", ")));
            }
            if !task.custom_fields.is_empty() {
                prompt.push_str("**Custom Fields:**\n");
                for (key, value) in &task.custom_fields {
                    prompt.push_str(&format!("  - {}: {}\n", key, value));
                }
            }
            prompt.push('\n');
        }
    } else if let Some(meta) = request
        .similarity_context
        .as_ref()
        .filter(|meta| meta.highest_similarity > 0.0)
    {
        prompt.push_str("## Similarity Search Results\n\n");
        prompt.push_str(&format!(
            "*No sufficiently similar tasks found. Highest similarity was {:.0}%.*\n",
            meta.highest_similarity * 100.0
        ));
        prompt.push_str("Consider the general dataset statistics and category breakdowns above for context.\n\n");
    }

    prompt.push_str("## Instructions\n\n");
    prompt.push_str("Based on the task description and historical data above:\n");
    prompt.push_str("1. Provide a realistic estimate in hours, size, and story points\n");
    prompt.push_str("2. Explain your reasoning considering task complexity\n");
    prompt.push_str("3. List key assumptions you're making\n");
    prompt.push_str("4. Identify potential risks or unknowns\n");
    prompt.push_str("5. Suggest any recommended actions\n\n");
    prompt.push_str("Respond with a valid JSON object following the specified format.\n");

    prompt
}
