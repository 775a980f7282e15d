//! Prompt Composer
//!
//! Pure functions building the instruction text for each of the three
//! stages. Later-stage prompts embed the prior stage results verbatim - the
//! section lists below constrain the *instruction* sent to the model, not
//! the shape of the response, which downstream consumers must tolerate as
//! arbitrary markdown.

/// Substituted for blank stage-1 input instead of leaving an empty hole
pub const STAGE1_PLACEHOLDER: &str = "[paste competitor material here]";

/// Stage 1: reverse-engineer the competitor's advertising materials
pub fn compose_stage1(competitor_material: &str) -> String {
    let input_content = if competitor_material.trim().is_empty() {
        STAGE1_PLACEHOLDER
    } else {
        competitor_material
    };

    format!(
        r#"# Role: Senior Advertising Strategy Consultant

# Goal
Reverse-engineer the competitor advertising material below into a strategy
teardown report that will guide our client's future creative production.

# Input Data
The following is the content of an ad library (copy, subtitles, transcripts,
attached files):
{input_content}

# Analysis Framework (must follow)
Output the report in markdown with exactly the sections below. Be insightful,
not descriptive, and quote original sentences as evidence.

---

## 1. Hooks & Angles
The 3 communication angles the competitor uses most, each with:
- **Angle type**:
- **Quoted copy**:
- **Why it works** (what psychology does it hit?):

---

## 2. Audience Profiling
Reverse-derive the primary audience:
- **Primary audience**:
- **Mindset**:
- **Why the message lands**:

---

## 3. Visual Strategy
- **Visual style**:
- **Key visual elements**:
- **Design intent**:

---

## 4. Structure Breakdown
The narrative rhythm of the effective ads:
- **The Hook** (opening):
- **The Body** (middle):
- **The CTA** (close):

---

## 5. Tone Analysis
- **Tone traits**:
- **Strategic intent behind the tone**:
- **Why this tone fits the audience**:

---

## 6. Pattern Library
2-3 recurring creative patterns, each with:
- **Pattern name**:
- **Structure** (e.g. case -> proof -> scarcity -> CTA):
- **Visual layout**:
- **Typical tone**:
- **When to use it** (who does it target, in what state?):

---

## 7. Strategic Action Plan

### 7-1. Angles to model
2-3 competitor strategies worth borrowing.

### 7-2. The Gap
Blind spots the competitor leaves open that we can own.

# Output Format
Respond with the full markdown report only; do not repeat these instructions."#
    )
}

/// Stage 2: compare our materials against the stage-1 analysis.
/// The stage-1 result is embedded verbatim.
pub fn compose_stage2(stage1_result: &str, our_materials: &str) -> String {
    format!(
        r#"# Role: Senior Advertising Strategy Consultant

# Context: Competitor Analysis (Step 1 result)
{stage1_result}

# Our Materials
{our_materials}

# Task
Compare our materials (including any attached files) against the competitor
analysis above. Output a markdown report with exactly these sections:

## 1. Inventory
What we already do, and do well.

## 2. Gap Analysis
What the competitor does that we don't.

## 3. Optimization
What we do, but could do better - be concrete about how.

## 4. Differentiation
Positions the competitor leaves open that we can own.

# Output Format
Respond with the full markdown report only; do not repeat these instructions."#
    )
}

/// Format instruction for stage 3, selected by whether a reference-format
/// attachment was supplied and successfully ingested
fn stage3_format_instruction(has_reference_format: bool) -> &'static str {
    if has_reference_format {
        "A reference-format attachment is included in this request. Mimic its \
         structure and layout only; ignore its content entirely."
    } else {
        "Present each brief as a numbered markdown section with the four \
         fields as bold labels."
    }
}

/// Stage 3: produce creative briefs grounded in both prior results.
/// Both prior stage results are embedded verbatim.
pub fn compose_stage3(
    stage1_result: &str,
    stage2_result: &str,
    extra_requirements: &str,
    has_reference_format: bool,
) -> String {
    format!(
        r#"# Role: Senior Advertising Strategy Consultant

# Context: Competitor Analysis (Step 1 result)
{stage1_result}

# Context: Gap Analysis (Step 2 result)
{stage2_result}

# Additional Requirements
{extra_requirements}

# Task
Based on the analyses above, produce 4 ad creative briefs. Each brief must
contain:

- **Key Message**
- **On-Visual Copy**
- **Body Copy**
- **Headline**

# Format
{format_instruction}"#,
        format_instruction = stage3_format_instruction(has_reference_format)
    )
}
