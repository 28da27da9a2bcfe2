//! Judge prompt templates.
//!
//! Every template is a plain function of its slots so the same inputs always
//! render the same prompt.

use crate::domain::QueryGroundTruth;

/// User turn sent with the chain-of-thought system prompt.
pub const COT_USER_MESSAGE: &str = "Please generate the chain-of-thought evaluation as specified.";

/// User turn sent with the answer-level system prompts.
pub const EVALUATION_USER_MESSAGE: &str = "Please generate the evaluation as specified.";

pub const COT_METRICS: &[&str] = &["helpfulness", "faithfulness", "instruction_following", "overall"];

pub const RETRIEVAL_METRICS: &[&str] = &[
    "faithfulness",
    "answer_relevancy",
    "context_recall",
    "answer_similarity",
];

pub const QUERY_METRICS: &[&str] = &["sql_semantic_equivalence", "answer_correctness"];

pub const QUESTION_UNDERSTANDING: &str = "question_understanding";

/// Strip leading and trailing whitespace from every line.
pub fn clean_prompt_indentation(prompt: &str) -> String {
    prompt.split('\n').map(str::trim).collect::<Vec<_>>().join("\n")
}

fn metric_schema(metrics: &[&str]) -> String {
    let entries: Vec<String> = metrics
        .iter()
        .map(|m| {
            format!(
                "        \"{m}\": {{\n            \"score\": <float 0-1>,\n            \"explanation\": \"<brief explanation>\"\n        }}"
            )
        })
        .collect();
    format!("{{\n{}\n}}", entries.join(",\n"))
}

/// Chain-of-thought system prompt.
pub fn chain_of_thought(
    agent_instructions: &str,
    collaboration_context: &str,
    transcript: &str,
    agent_response: &str,
) -> String {
    format!(
        r#"
        You are an expert evaluator analyzing AI Agent execution. Evaluate the agent's chain of thought on three key metrics and an overall score.

        Agent Instructions:
        {agent_instructions}

        Collaboration Context:
        {collaboration_context}

        Agent Chain-of-Thought:
        {transcript}

        Final Agent Response:
        {agent_response}

        Helpfulness: How well does the execution satisfy explicit and implicit expectations?
        - Is it sensible, coherent, and clear?
        - Does it solve the task effectively and anticipate user needs?

        Faithfulness: Does the execution stick to available information and context?
        - Does it avoid unfounded claims and stay within the given information?
        - Are conclusions supported and consistent with the context?

        Instruction Following: Does it respect all explicit directions?
        - Does it follow specific requirements and constraints?
        - Does it complete every requested step?

        Output your evaluation as a JSON object of this exact shape:

        {schema}

        Keep explanations concise and grounded in specific parts of the execution. Output only the JSON object, with no text before or after it.
        "#,
        schema = metric_schema(COT_METRICS),
    )
}

/// Retrieval-quality system prompt.
pub fn retrieval(question: &str, contexts: &[String], reference_answer: &str, agent_response: &str) -> String {
    let rendered_contexts = if contexts.is_empty() {
        "None".to_string()
    } else {
        contexts
            .iter()
            .enumerate()
            .map(|(i, c)| format!("[{}] {}", i + 1, c))
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!(
        r#"You are an expert evaluator for retrieval-augmented answers. Score the response below.

        Question: {question}

        Retrieved Contexts:
        {rendered_contexts}

        Ground Truth Answer: {reference_answer}
        Generated Answer: {agent_response}

        Faithfulness: Is every claim in the generated answer supported by the retrieved contexts?
        Answer Relevancy: Does the generated answer address the question directly?
        Context Recall: Do the retrieved contexts contain the information needed for the ground truth answer?
        Answer Similarity: How semantically close is the generated answer to the ground truth answer?

        Provide your evaluation in this exact JSON format:
        {{
            "metrics_scores": {schema}
        }}
        "#,
        schema = metric_schema(RETRIEVAL_METRICS),
    )
}

/// Generated-query system prompt.
pub fn query_generation(
    question: &str,
    truth: &QueryGroundTruth,
    generated_query: &str,
    agent_response: &str,
    include_question_understanding: bool,
) -> String {
    let mut metrics: Vec<&str> = QUERY_METRICS.to_vec();
    let mut understanding = String::new();
    if include_question_understanding {
        metrics.push(QUESTION_UNDERSTANDING);
        understanding.push_str(
            "Question Understanding: Does the generated SQL capture the intent and constraints of the question?\n",
        );
    }
    format!(
        r#"You are an expert evaluator for Text2SQL systems. Evaluate the following response.

        Question: {question}
        Database Schema: {schema_context}

        Ground Truth SQL: {truth_sql}
        Generated SQL: {generated_query}

        Ground Truth Answer: {truth_answer}
        Generated Answer: {agent_response}

        Query Result: {query_result}

        Provide scores (0-1) and explanations for these metrics:

        SQL Semantic Equivalence: Would the generated SQL produce the same results as the ground truth SQL?
        Answer Correctness: Does the generated answer represent the query results and match the ground truth?
        {understanding}
        Provide your evaluation in this exact JSON format:
        {{
            "metrics_scores": {schema}
        }}
        "#,
        schema_context = truth.ground_truth_sql_context,
        truth_sql = truth.ground_truth_sql_query,
        truth_answer = truth.ground_truth_answer,
        query_result = truth.ground_truth_query_result,
        schema = metric_schema(&metrics),
    )
}
