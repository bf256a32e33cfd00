/// 資格情報をログ出力用に伏せ字化する。
///
/// 先頭4文字のみを残し、残りを `***` に置き換えます。
pub(crate) fn redact(input: &str) -> String {
    let mut chars = input.chars();
    let prefix: String = chars.by_ref().take(4).collect();
    if chars.next().is_none() {
        "****".to_string()
    } else {
        format!("{prefix}***")
    }
}
