//! ベンダー応答テキストの整形ユーティリティ。
//!
//! ベンダーから返るエラーメッセージはそのままジョブに保存されエンドユーザーに表示されるため、
//! 空白の正規化と長さの上限を適用します。

/// ジョブに保存するエラーメッセージの最大文字数。
pub(crate) const MAX_VENDOR_MESSAGE_CHARS: usize = 500;

/// メッセージが空だった場合に保存する既定の文言。
pub(crate) const DEFAULT_FAILURE_MESSAGE: &str = "video generation failed";

/// 文字境界を壊さずに `max_chars` 文字で切り詰める。
#[must_use]
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

/// ベンダーのエラーメッセージを保存可能な形に整える。
///
/// 連続する空白・改行を1つのスペースにまとめ、上限文字数で切り詰めます。
/// 結果が空の場合は [`DEFAULT_FAILURE_MESSAGE`] を返します。
#[must_use]
pub(crate) fn sanitize_vendor_message(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return DEFAULT_FAILURE_MESSAGE.to_string();
    }
    truncate_chars(&collapsed, MAX_VENDOR_MESSAGE_CHARS)
}
