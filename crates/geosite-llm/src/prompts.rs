//! Prompt templates for the chat model

use geosite_core::models::{HardConstraint, NarrationRequest};
use serde_json::json;
use std::collections::BTreeMap;

pub const PARSE_SYSTEM: &str = "你是专业的选址需求分析师，输出严格JSON";
pub const RULES_SYSTEM: &str = "你是专业的选址约束工程师，输出严格JSON";
pub const NARRATE_SYSTEM: &str = "你是专业的选址顾问，输出严格JSON";

/// Request decomposition prompt
pub fn parse_prompt(request: &str) -> String {
    format!(
        r#"请分析用户的选址需求并拆解成结构化格式。

用户输入：{request}

返回JSON对象 {{"requirements": [...]}}，列表每项包含：
- pos: 正向需求
- neg: 负向需求
- mustsee: 是否硬性约束(true/false)
- type: 类型（区域/用地类型/面积/成本/配套/其他）

示例输入："天河区20亩工业用地"
示例输出：
{{"requirements": [
    {{"pos": "天河区", "neg": null, "mustsee": true, "type": "区域"}},
    {{"pos": "工业用地", "neg": null, "mustsee": true, "type": "用地类型"}},
    {{"pos": "20亩", "neg": null, "mustsee": false, "type": "面积"}}
]}}

示例输入："不要工业用地，最好商业或办公"
示例输出：
{{"requirements": [
    {{"pos": "商业用地", "neg": null, "mustsee": false, "type": "用地类型"}},
    {{"pos": "办公用地", "neg": null, "mustsee": false, "type": "用地类型"}},
    {{"pos": null, "neg": "工业用地", "mustsee": true, "type": "用地类型"}}
]}}

示例输入："地价每平米不高于3000元，靠近港口或货运站"
示例输出：
{{"requirements": [
    {{"pos": "地价≤3000元/㎡", "neg": null, "mustsee": true, "type": "成本"}},
    {{"pos": "近港口", "neg": null, "mustsee": false, "type": "配套"}},
    {{"pos": "近货运站", "neg": null, "mustsee": false, "type": "配套"}}
]}}

请严格按JSON格式返回，不要其他内容。"#
    )
}

/// Hard-constraint to column-rule mapping prompt
pub fn rules_prompt(
    constraints: &[HardConstraint],
    columns: &[String],
    samples: &BTreeMap<String, Vec<String>>,
) -> String {
    let constraints: Vec<_> = constraints
        .iter()
        .map(|c| json!({ "text": c.text, "type": c.category.label(), "is_negative": c.is_negative }))
        .collect();

    format!(
        "你是城市选址约束工程师。请将以下硬性约束映射到数据表列的可执行规则，并给出同义/等价表达用于语义检索。\n\
         列名: {}\n示例值(部分): {}\n硬性约束: {}\n\
         请返回JSON对象：{{\n  \"rules\": [\n    {{\"column\": str, \"op\": str, \"value\": any, \"negative\": bool, \"confidence\": float}}\n  ],\n  \
         \"synonyms\": {{\"原始约束文本\": [\"同义1\", \"同义2\"]}}\n}}\n\
         操作符仅限: ==, in, contains, regex, <=, >=, <, >。数值列使用数值比较，类别/文本列使用 contains/in/== 或 regex。",
        json!(columns),
        json!(samples),
        json!(constraints),
    )
}

/// Recommendation narrative prompt
pub fn narrate_prompt(request: &NarrationRequest) -> String {
    let candidates: String = request
        .candidates
        .iter()
        .enumerate()
        .map(|(i, context)| format!("序号{}: \"{}\"\n", i + 1, context))
        .collect();
    let constraints = if request.constraint_summary.is_empty() {
        "无".to_string()
    } else {
        json!(request.constraint_summary).to_string()
    };
    let count = request.max_sites.min(request.candidates.len());

    format!(
        r#"你是专业的选址顾问。请根据候选地块和用户需求，推荐最优方案。

### 候选地块
{candidates}
### 用户需求
- 原始需求：{raw}
- 关键要求：{keywords}
- 必选条件：{constraints}

### 任务
从候选中选择最优的{count}个地块，生成推荐报告。

### 输出格式（严格JSON）
{{
    "recommendations": "地块1->地块2->地块3",
    "summary": "总体推荐理由",
    "sites": {{
        "1": {{
            "name": "地块名称",
            "reason": "推荐理由",
            "score": 8.5,
            "advantages": ["优势1", "优势2", "优势3"],
            "risks": ["风险1", "风险2"]
        }}
    }}
}}

### 评分标准
- 区位优势：交通、配套
- 成本因素：地价、开发成本
- 政策环境：用地性质、规划
- 发展潜力：未来增值空间

每个地块的优势不少于3条、风险不少于2条；尽量引用上下文中的具体数据（如距离、评分、价格等）。
请按JSON格式输出，每个地块评分1-10分。"#,
        raw = request.request,
        keywords = json!(request.requirements),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use geosite_core::models::ConstraintCategory;

    #[test]
    fn test_parse_prompt_embeds_request() {
        let prompt = parse_prompt("天河区商业用地");
        assert!(prompt.contains("用户输入：天河区商业用地"));
        assert!(prompt.contains("\"requirements\""));
    }

    #[test]
    fn test_rules_prompt_lists_columns_and_constraints() {
        let constraints = vec![HardConstraint {
            text: "靠近地铁".to_string(),
            category: ConstraintCategory::Amenity,
            is_negative: false,
        }];
        let mut samples = BTreeMap::new();
        samples.insert("land_use".to_string(), vec!["工业用地".to_string()]);

        let prompt = rules_prompt(&constraints, &["land_use".to_string()], &samples);
        assert!(prompt.contains("[\"land_use\"]"));
        assert!(prompt.contains("靠近地铁"));
        assert!(prompt.contains("配套"));
    }

    #[test]
    fn test_narrate_prompt_numbers_candidates() {
        let request = NarrationRequest {
            request: "近地铁".to_string(),
            requirements: vec!["近地铁".to_string()],
            constraint_summary: vec![],
            candidates: vec!["A地块".to_string(), "B地块".to_string()],
            max_sites: 10,
        };
        let prompt = narrate_prompt(&request);
        assert!(prompt.contains("序号1: \"A地块\""));
        assert!(prompt.contains("序号2: \"B地块\""));
        assert!(prompt.contains("必选条件：无"));
        assert!(prompt.contains("最优的2个地块"));
    }
}
