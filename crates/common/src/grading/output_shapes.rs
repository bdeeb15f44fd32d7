//! Example output shapes shown to the model
//!
//! Each category has a JSON literal describing the fields the model must
//! return. The literal is pretty-printed into the prompt's
//! `{json_format_example_str}` placeholder.

use super::submission::SubmissionType;
use serde_json::{json, Value};

/// Example grading result for a category
pub fn example_output(submission_type: SubmissionType) -> Value {
    match submission_type {
        SubmissionType::ParagraphReview => paragraph_review(),
        SubmissionType::QuizCorrection => quiz_correction(),
        SubmissionType::WorksheetCorrection => worksheet_correction(),
        SubmissionType::WorkbookScoring => workbook_scoring(),
    }
}

/// Pretty-printed example, as substituted into the template
pub fn example_output_str(submission_type: SubmissionType) -> String {
    let example = example_output(submission_type);
    serde_json::to_string_pretty(&example).unwrap_or_else(|_| example.to_string())
}

fn paragraph_review() -> Value {
    json!({
        "submissionType": "段落寫作評閱",
        "error_analysis": [
            {
                "original_sentence": "With my heart beating rapidly in excitement, I tried to look past the sea olf people.",
                "error_type": "拼寫錯誤",
                "error_content": "olf 應為 of",
                "suggestion": "With my heart beating rapidly in excitement, I tried to look past the sea of people."
            },
            {
                "original_sentence": "The constant chatter around me became impatient as time trickled by.",
                "error_type": "用字遣詞",
                "error_content": "chatter 本身不會感到 impatient，應是人感到 impatient。",
                "suggestion": "I became impatient with the constant chatter around me as time trickled by."
            }
        ],
        "rubric_evaluation": {
            "structure_performance": [
                {"item": "Task Fulfillment and Purpose", "score": 8, "comment": "很好地完成了任務，主題明確。"},
                {"item": "Topic Sentence and Main Idea", "score": 7, "comment": "主旨明確，圍繞著經歷展開。"},
                {"item": "Supporting Sentences and Argument Development", "score": 7, "comment": "細節描述豐富，但可以更精煉。"},
                {"item": "Cohesion and Coherence", "score": 7, "comment": "整體連貫性不錯。"},
                {"item": "Concluding Sentence and Closure", "score": 8, "comment": "結尾點明了主題。"}
            ],
            "content_language": [
                {"item": "Depth of Analysis and Critical Thinking", "score": 7, "comment": "可以更深入地挖掘內心感受。"},
                {"item": "Grammar and Sentence Structure", "score": 6, "comment": "存在一些文法錯誤。"},
                {"item": "Vocabulary and Word Choice", "score": 7, "comment": "可以嘗試使用更多樣化的詞彙。"},
                {"item": "Spelling, Punctuation, and Mechanics", "score": 6, "comment": "拼寫和標點符號需要仔細檢查。"},
                {"item": "Persuasive Effectiveness and Audience Awareness", "score": 7, "comment": "故事能引起讀者的共鳴。"}
            ]
        },
        "overall_assessment": {
            "total_score": "68/100",
            "suggested_grade": "C+",
            "grade_basis": "依據七年級標準評量。",
            "general_comment": "整體而言，內容生動有趣，但文法和拼寫方面仍需加強。"
        },
        "model_paragraph": "With my heart beating rapidly in excitement, I tried to look past the sea of people and see through the large glass windows of the department store.",
        "teacher_summary_feedback": "你的作文內容很有趣，敘述流暢。在文法和拼寫方面還有進步的空間。"
    })
}

fn quiz_correction() -> Value {
    json!({
        "submissionType": "測驗寫作評改",
        "error_analysis_table": [
            {
                "original_sentence": "It was the anniversary of the mall where a mutitude of discounts took place.",
                "error_type": "拼寫錯誤 / 用字選擇",
                "problem_description": "單字 'mutitude' 拼寫錯誤，應為 'multitude'。'took place' 用於描述折扣略顯生硬。",
                "suggestion": "It was the anniversary of the mall where a multitude of discounts were offered."
            },
            {
                "original_sentence": "Others either surrendered or got cut off after the mall closed.",
                "error_type": "用詞選擇",
                "problem_description": "'surrendered' 在此情境下稍正式，可用 'gave up'。",
                "suggestion": "Others either gave up or got cut off after the mall closed."
            }
        ],
        "summary_feedback_for_student": {
            "summary_feedback": "你的作文整體結構完整，敘事流暢。在拼寫和用詞的準確性上還有進步空間。",
            "total_score_display": "92 / 100",
            "suggested_grade_display": "A-",
            "grade_basis_display": "根據國中三年級寫作標準"
        },
        "revised_demonstration": {
            "original_with_errors_highlighted": "It was the anniversary of the mall where a <strong>mutitude</strong> of discounts took place.",
            "suggested_revision": "It was the anniversary of the mall where a large number of discounts were offered."
        },
        "positive_learning_feedback": "你的寫作展現了很強的敘事能力和豐富的詞彙量。繼續保持你對寫作的熱情與好奇心！"
    })
}

fn question_feedback(number: &str, source_example: &str, correct_answer: &str) -> Value {
    json!({
        "question_number": number,
        "student_answer": "[學生實際的答案]",
        "is_correct": "[✅/❌]",
        "comment": "[根據學生答案正確或錯誤生成內容]",
        "correct_answer": correct_answer,
        "answer_source_query": "[標準答案實際出處(search_tool(query=''))]",
        "answer_source_content": format!("[標準答案實際的內容(格式範例:{})]", source_example)
    })
}

fn score_row(section: &str) -> Value {
    json!({
        "section": section,
        "max_score": "[根據考卷上的配分]",
        "obtained_score": "[計算此部分得分]"
    })
}

fn score_summary(
    submission_type: SubmissionType,
    title: &str,
    sections: Vec<Value>,
    score_rows: Vec<Value>,
) -> Value {
    json!({
        "submissionType": submission_type.as_str(),
        "title": title,
        "sections": sections,
        "overall_score_summary_title": "✅ 總分統計與等第建議",
        "score_breakdown_table": score_rows,
        "final_total_score_text": "總分：100 學生分數：[學生得分]",
        "final_suggested_grade_title": "🔺等第建議",
        "final_suggested_grade_text": "[根據總分生成建議等第與說明]",
        "overall_feedback_title": "📚 總結性回饋建議（可複製給學生）",
        "overall_feedback": "[針對學生考卷的作答整體表現生成正面總結性回饋]"
    })
}

fn section(title: String, summary: String, correct_answer: &str, examples: &[&str]) -> Value {
    let questions: Vec<Value> = examples
        .iter()
        .enumerate()
        .map(|(i, example)| question_feedback(&(i + 1).to_string(), example, correct_answer))
        .collect();

    json!({
        "section_title": title,
        "questions_feedback": questions,
        "section_summary": summary
    })
}

fn worksheet_section(examples: &[&str]) -> Value {
    section(
        "[考卷上的大標題(粗體)]".to_string(),
        "[根據學生在此部分的表現生成總結]".to_string(),
        "[[標準答案]中對應題號的正確答案]",
        examples,
    )
}

fn workbook_section(numeral: &str, examples: &[&str]) -> Value {
    section(
        format!("{} [考卷上的大標題與配分]", numeral),
        format!("[根據學生在此部分的表現生成總結，並依照{}的配分計分]", numeral),
        "[[學生年級]習作標準答案]",
        examples,
    )
}

fn worksheet_correction() -> Value {
    score_summary(
        SubmissionType::WorksheetCorrection,
        "📋 學習單批改結果",
        vec![
            worksheet_section(&[
                "Lesson 1/Pre-listening Questions/1:Yes, there are two sports teams in my school.",
                "Lesson 1/Pre-listening Questions/2:Yes, I play sports in my free time.",
            ]),
            worksheet_section(&["Lesson 1/While-listening Notes/1:Do you practice basketball after school every day"]),
            worksheet_section(&["Lesson 1/Dialogue Mind Map/1:basketball"]),
            worksheet_section(&["Lesson 1/Post-listening Questions and Answers/1:They worry about their grades at school."]),
        ],
        vec![score_row("[考卷上的大標題(粗體)]"); 4],
    )
}

fn workbook_scoring() -> Value {
    score_summary(
        SubmissionType::WorkbookScoring,
        "📘讀寫習作批改結果",
        vec![
            workbook_section("I.", &[
                "Book 5/Lesson 2/I Read and Write/1:interests",
                "Book 5/Lesson 2/I Read and Write/2:reason",
            ]),
            workbook_section("II.", &["Book 5/Lesson 2/II Look and Fill In/1:tiring"]),
            workbook_section("III.", &["Book 5/Lesson 2/III Read and Write/1:James thought (that) Linda would like the gift."]),
            workbook_section("IV.", &["Book 5/Lesson 2/IV Fill In/1:reasons / choice"]),
        ],
        vec![
            score_row("I. Vocabulary & Grammar"),
            score_row("II. Cloze Test"),
            score_row("III. Reading Comprehension"),
            score_row("IV. Write"),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_example_is_tagged_with_its_category() {
        for t in SubmissionType::ALL {
            let example = example_output(t);
            assert_eq!(example["submissionType"], t.as_str());
        }
    }

    #[test]
    fn test_paragraph_fields() {
        let example = example_output(SubmissionType::ParagraphReview);
        for field in ["error_analysis", "rubric_evaluation", "overall_assessment", "model_paragraph"] {
            assert!(example.get(field).is_some(), "missing {field}");
        }
    }

    #[test]
    fn test_worksheet_sections() {
        let example = example_output(SubmissionType::WorksheetCorrection);
        assert_eq!(example["sections"].as_array().unwrap().len(), 4);
        assert_eq!(example["score_breakdown_table"].as_array().unwrap().len(), 4);
        assert_eq!(example["sections"][0]["questions_feedback"][1]["question_number"], "2");

        let workbook = example_output(SubmissionType::WorkbookScoring);
        assert_eq!(workbook["score_breakdown_table"][1]["section"], "II. Cloze Test");
    }

    #[test]
    fn test_keys_keep_literal_order() {
        let example = example_output(SubmissionType::ParagraphReview);
        let keys: Vec<&str> = example.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys[0], "submissionType");
        assert_eq!(keys[1], "error_analysis");

        let text = example_output_str(SubmissionType::WorksheetCorrection);
        assert!(text.starts_with("{\n  \"submissionType\": \"學習單批改\""));
    }

    #[test]
    fn test_example_string_is_pretty_and_unescaped() {
        let text = example_output_str(SubmissionType::QuizCorrection);
        assert!(text.starts_with("{\n  \""));
        assert!(text.contains("測驗寫作評改"));
    }
}
