// crates/narrative-extractor/src/prompt.rs
// ============================================================================
// Module: Extraction Prompts
// Description: System and user prompt assembly for the extraction LLM call.
// Purpose: Keep the wording the extractor sends the model in one place,
//          separate from the retry/fallback orchestration in `extractor`.
// Dependencies: narrative-core
// ============================================================================

//! ## Overview
//! The system prompt restates the current canonical state (so the model
//! never has to be told the world twice) plus the closed event-type
//! taxonomy and the "don't invent items, don't move dead characters,
//! always emit at least one event" house rules. The user prompt just
//! wraps the turn's user message and assistant draft.

use narrative_core::state::CanonicalState;

const MAX_SUMMARISED_CHARACTERS: usize = 10;
const MAX_SUMMARISED_ITEMS: usize = 10;

/// Builds the system prompt for turn `turn` against `state`.
#[must_use]
pub fn system_prompt(state: &CanonicalState, turn: u64) -> String {
    let summary = format_state_summary(state);
    format!(
        "你是一个事件提取器，负责从对话草稿中提取结构化事件。\n\n\
         ## 当前状态（Turn {turn}）\n\n\
         {summary}\n\n\
         ## 核心规则\n\n\
         1. **任何状态变化必须写入 state_patch**\n\
         \u{20}  - 如果角色位置改变，必须在 state_patch.entity_updates 中更新 location_id\n\
         \u{20}  - 如果物品所有权改变，必须在 state_patch.entity_updates 中更新 owner_id\n\
         \u{20}  - 如果角色生死状态改变，必须在 state_patch.entity_updates 中更新 alive\n\
         \u{20}  - 如果时间推进，必须在 state_patch.time_update 中更新\n\n\
         2. **不可凭空出现物品/复活/瞬移**\n\
         \u{20}  - 如果草稿中出现了当前状态中不存在的物品，必须标记为 open_questions\n\
         \u{20}  - 如果草稿中描述了死亡角色的行动，必须标记为 open_questions\n\
         \u{20}  - 如果角色位置改变但没有明确的移动描述，必须标记为 open_questions\n\n\
         3. **事件类型必须准确**\n\
         \u{20}  - OWNERSHIP_CHANGE: 物品所有权变更\n\
         \u{20}  - DEATH: 角色死亡\n\
         \u{20}  - REVIVAL: 角色复活\n\
         \u{20}  - TRAVEL: 角色移动\n\
         \u{20}  - FACTION_CHANGE: 阵营变更\n\
         \u{20}  - QUEST_START/QUEST_COMPLETE/QUEST_FAIL: 任务相关\n\
         \u{20}  - ITEM_CREATE/ITEM_DESTROY: 物品创建/销毁\n\
         \u{20}  - TIME_ADVANCE: 时间推进\n\
         \u{20}  - OTHER: 其他事件\n\n\
         4. **必须输出至少 1 个事件**\n\
         \u{20}  - 即使没有明显的事件，也要创建一个描述当前对话的 OTHER 类型事件\n\n\
         ## 输出格式\n\n\
         严格按照 JSON Schema 输出，包含：\n\
         - events: 事件列表（至少 1 个）\n\
         - open_questions: 需要用户澄清的问题列表（如果有）\n\n\
         如果检测到需要澄清的情况（如凭空出现物品、死亡角色行动等），在 open_questions 中列出问题。\n"
    )
}

/// Builds the user prompt wrapping the turn's user message and draft.
#[must_use]
pub fn user_prompt(user_message: &str, assistant_draft: &str) -> String {
    format!(
        "请从以下对话中提取事件：\n\n\
         ## 用户消息\n{user_message}\n\n\
         ## 助手草稿\n{assistant_draft}\n\n\
         请提取所有状态变化相关的事件，并确保：\n\
         1. 每个事件都有对应的 state_patch\n\
         2. 如果检测到需要澄清的情况，在 open_questions 中列出\n\
         3. 至少输出 1 个事件\n"
    )
}

/// Builds the stricter reminder appended on retry, after a parse failure.
#[must_use]
pub fn retry_reminder() -> String {
    "重要：上次解析失败。请严格按照 JSON Schema 输出，确保所有字段都符合要求。".to_string()
}

fn format_state_summary(state: &CanonicalState) -> String {
    let mut lines = Vec::new();

    lines.push(format!("时间: {} (order: {})", state.time.calendar, state.time.anchor.order));

    lines.push(format!("\n玩家: {} @ {}", state.player.name, state.player.location_id));
    if !state.player.party.is_empty() {
        let members: Vec<&str> = state.player.party.iter().map(|c| c.as_str()).collect();
        lines.push(format!("  队伍: {}", members.join(", ")));
    }
    if !state.player.inventory.is_empty() {
        let items: Vec<&str> = state.player.inventory.iter().map(|i| i.as_str()).collect();
        lines.push(format!("  物品: {}", items.join(", ")));
    }

    lines.push("\n关键角色:".to_string());
    for (char_id, character) in state.entities.characters.iter().take(MAX_SUMMARISED_CHARACTERS) {
        let status = if character.alive { "存活" } else { "死亡" };
        let location_name = state
            .entities
            .locations
            .get(character.location_id.as_str())
            .map_or_else(|| character.location_id.as_str().to_string(), |l| l.name.clone());
        lines.push(format!("  - {} ({char_id}): {status}, 位置: {location_name}", character.name));
    }

    if !state.entities.items.is_empty() {
        lines.push("\n关键物品:".to_string());
        for (item_id, item) in state.entities.items.iter().take(MAX_SUMMARISED_ITEMS) {
            let owner_info = item.owner_id.as_ref().map_or_else(
                || format!("位置: {}", item.location_id.as_ref().map_or("未知", |l| l.as_str())),
                |owner| format!("拥有者: {owner}"),
            );
            lines.push(format!("  - {} ({item_id}): {owner_info}", item.name));
        }
    }

    if !state.constraints.unique_item_ids.is_empty() {
        let ids: Vec<&str> = state.constraints.unique_item_ids.iter().map(|i| i.as_str()).collect();
        lines.push(format!("\n唯一物品: {}", ids.join(", ")));
    }
    if !state.constraints.immutable_events.is_empty() {
        lines.push(format!("不可变事件: {} 个", state.constraints.immutable_events.len()));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use narrative_core::identifiers::StoryId;
    use narrative_core::time::Timestamp;

    #[test]
    fn system_prompt_restates_turn_and_calendar() {
        let state = CanonicalState::initial(StoryId::new("s1"), Timestamp::from_unix_seconds(0));
        let prompt = system_prompt(&state, 4);
        assert!(prompt.contains("Turn 4"));
        assert!(prompt.contains("初始时间"));
    }

    #[test]
    fn user_prompt_wraps_message_and_draft() {
        let prompt = user_prompt("你往哪走？", "曹操前往许昌。");
        assert!(prompt.contains("你往哪走？"));
        assert!(prompt.contains("曹操前往许昌。"));
    }
}
