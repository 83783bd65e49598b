use std::fmt::Display;
use std::time::Duration;

/// Entradas por mensaje en los listados
pub const LIST_BATCH_SIZE: usize = 20;

/// Longitud máxima de un mensaje de Discord, en caracteres
pub const MESSAGE_LIMIT: usize = 2000;

/// Separador de líneas dentro de un mensaje de listado
const LINE_BREAK: &str = "\n";

/// Sustituye cada `{}` de la plantilla, en orden, por los argumentos.
///
/// Los marcadores sobrantes quedan vacíos; los argumentos sobrantes se ignoran.
pub fn render(template: &str, args: &[&dyn Display]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut args = args.iter();
    let mut rest = template;

    while let Some(pos) = rest.find("{}") {
        out.push_str(&rest[..pos]);
        if let Some(arg) = args.next() {
            out.push_str(&arg.to_string());
        }
        rest = &rest[pos + 2..];
    }
    out.push_str(rest);
    out
}

/// Agrupa entradas en mensajes de como mucho `size` líneas y
/// [`MESSAGE_LIMIT`] caracteres, preservando el orden.
///
/// Una entrada que por sí sola excede el límite se recorta.
pub fn batches(entries: &[String], size: usize) -> Vec<String> {
    let size = size.max(1);
    let separator = LINE_BREAK.chars().count();
    let mut messages = Vec::new();
    let mut current = String::new();
    let mut lines = 0;
    let mut chars = 0;

    for entry in entries {
        let entry: String = entry.chars().take(MESSAGE_LIMIT).collect();
        let len = entry.chars().count();

        if lines == size || (lines > 0 && chars + separator + len > MESSAGE_LIMIT) {
            messages.push(std::mem::take(&mut current));
            lines = 0;
            chars = 0;
        }

        if lines > 0 {
            current.push_str(LINE_BREAK);
            chars += separator;
        }
        current.push_str(&entry);
        chars += len;
        lines += 1;
    }

    if lines > 0 {
        messages.push(current);
    }
    messages
}

/// Formatea duración como `m:ss` o `h:mm:ss`
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_render_fills_in_order() {
        assert_eq!(
            render("🔊 Volumen {}% por {}", &[&40, &"ana"]),
            "🔊 Volumen 40% por ana"
        );
        assert_eq!(render("sin marcadores", &[&1]), "sin marcadores");
        assert_eq!(render("{} y {}", &[&"uno"]), "uno y ");
    }

    #[test]
    fn test_batches_of_twenty() {
        let entries: Vec<String> = (0..45).map(|i| format!("pista{:02}", i)).collect();
        let messages = batches(&entries, LIST_BATCH_SIZE);

        let sizes: Vec<usize> = messages.iter().map(|m| m.split(LINE_BREAK).count()).collect();
        assert_eq!(sizes, vec![20, 20, 5]);
        assert!(messages[0].starts_with("pista00\npista01"));
        assert!(messages[2].ends_with("pista44"));
    }

    #[test]
    fn test_small_listing_is_one_message() {
        let entries = vec!["a".to_string(), "b".to_string()];
        assert_eq!(batches(&entries, LIST_BATCH_SIZE), vec!["a\nb"]);
        assert!(batches(&[], LIST_BATCH_SIZE).is_empty());
    }

    #[test]
    fn test_long_entries_split_before_message_limit() {
        let entries: Vec<String> = (0..20)
            .map(|i| format!("{:03}{}", i, "ñ".repeat(117)))
            .collect();
        let messages = batches(&entries, LIST_BATCH_SIZE);

        // 17 entradas de 120 caracteres ocuparían 2056
        let sizes: Vec<usize> = messages.iter().map(|m| m.split(LINE_BREAK).count()).collect();
        assert_eq!(sizes, vec![16, 4]);
        for message in &messages {
            assert!(message.chars().count() <= MESSAGE_LIMIT);
        }
        let joined: Vec<&str> = messages.iter().flat_map(|m| m.split(LINE_BREAK)).collect();
        assert_eq!(joined.len(), 20);
        assert_eq!(joined[19], entries[19]);
    }

    #[test]
    fn test_oversized_entry_is_truncated() {
        let entries = vec!["x".repeat(2500), "corta".to_string()];
        let messages = batches(&entries, LIST_BATCH_SIZE);

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].chars().count(), MESSAGE_LIMIT);
        assert_eq!(messages[1], "corta");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(83)), "1:23");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
    }
}
