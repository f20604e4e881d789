use comanda_core::domain::menu::MenuSnapshot;
use comanda_core::domain::session::ConversationTurn;
use comanda_core::domain::tenant::Tenant;

/// Who the assistant speaks as, taken from the tenant record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Persona {
    pub waiter_name: String,
    pub business_name: String,
    pub table_number_min: u32,
    pub table_number_max: u32,
}

impl From<&Tenant> for Persona {
    fn from(tenant: &Tenant) -> Self {
        Self {
            waiter_name: tenant.waiter_name.clone(),
            business_name: tenant.business_name.clone(),
            table_number_min: tenant.table_number_min,
            table_number_max: tenant.table_number_max,
        }
    }
}

/// The summary layout the parser understands. `{trigger}` marks the reply as
/// an order summary.
fn summary_template(trigger: &str) -> String {
    [
        format!("  🍽️ {trigger} 🍽️"),
        "  Mesa: {mesa}".to_string(),
        "  Pedido:".to_string(),
        "    - Plato 1: {nombre_plato_1} - {precio_plato_1}€ x{cantidad_plato_1}".to_string(),
        "    --> Extra: {nombre_extra_1} - {precio_extra_1}€ x{cantidad_extra_1}".to_string(),
        "    --> Sin: {nombre_sin_1}".to_string(),
        "    - Plato 2: {nombre_plato_2} - {precio_plato_2}€ x{cantidad_plato_2}".to_string(),
        "    - Bebida 1: {nombre_bebida_1} - {precio_bebida_1}€ x{cantidad_bebida_1}".to_string(),
        "  Total: {total} EUR".to_string(),
        "  Muchas gracias por su pedido ❤️".to_string(),
    ]
    .join("\n")
}

pub fn build_system_prompt(
    persona: &Persona,
    summary_trigger: &str,
    menu: &MenuSnapshot,
    conversation: &[ConversationTurn],
) -> String {
    let menu_json = serde_json::to_string(menu).unwrap_or_else(|_| "[]".to_string());

    let mut prompt = format!(
        "Eres {waiter}, un amable camarero del restaurante {business}. \
         Atiendes a los clientes de manera educada y eficiente. \
         Trabajas exclusivamente con la información del menú JSON: \
         no inventes platos, precios ni ingredientes.\n\n\
         Reglas de atención:\n\
         - Primero pregunta el número de mesa (entre {min} y {max}) y recuérdalo.\n\
         - No continúes hasta que el cliente indique su mesa.\n\
         - Ayuda a explorar el menú y toma nota de los pedidos.\n\
         - Anota modificaciones (sin cebolla, extra de queso...) solo si el menú las ofrece.\n\
         - Las bebidas no llevan extras ni ingredientes excluidos.\n\
         - Si piden algo que no está en el menú o no está disponible, indícalo.\n\
         - No confirmes el pedido hasta que el cliente lo indique.\n\
         - Cuando el cliente termine, genera un resumen con exactamente este formato:\n\
         {template}\n\
         Este formato es clave para registrar el pedido.\n\n\
         Menú en formato JSON:\n{menu_json}\n\n\
         Historial de la conversación:\n",
        waiter = persona.waiter_name,
        business = persona.business_name,
        min = persona.table_number_min,
        max = persona.table_number_max,
        template = summary_template(summary_trigger),
    );

    for turn in conversation {
        prompt.push_str("Usuario: ");
        prompt.push_str(&turn.user);
        prompt.push_str("\nBot: ");
        prompt.push_str(&turn.bot);
        prompt.push('\n');
    }

    prompt
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use comanda_core::domain::menu::{MenuCategory, MenuItem, MenuSnapshot};
    use comanda_core::domain::session::ConversationTurn;
    use comanda_core::order_summary::{is_order_summary, parse_order_summary};

    use super::{build_system_prompt, summary_template, Persona};

    fn persona() -> Persona {
        Persona {
            waiter_name: "Juan".to_string(),
            business_name: "El Mundo del Campero".to_string(),
            table_number_min: 1,
            table_number_max: 12,
        }
    }

    #[test]
    fn prompt_carries_persona_menu_and_transcript() {
        let menu = MenuSnapshot(vec![MenuCategory {
            name: "Platos".to_string(),
            items: vec![MenuItem {
                name: "Campero Mixto".to_string(),
                ingredients: None,
                price: Decimal::new(750, 2),
                available: true,
                extras: vec![],
            }],
        }]);
        let conversation = vec![ConversationTurn {
            user: "Hola".to_string(),
            bot: "¡Hola! ¿Qué mesa?".to_string(),
        }];

        let prompt = build_system_prompt(&persona(), "Resumen del Pedido:", &menu, &conversation);

        assert!(prompt.starts_with("Eres Juan, un amable camarero del restaurante El Mundo del Campero."));
        assert!(prompt.contains("entre 1 y 12"));
        assert!(prompt.contains("Campero Mixto"));
        assert!(prompt.contains("🍽️ Resumen del Pedido: 🍽️"));
        assert!(prompt.ends_with("Usuario: Hola\nBot: ¡Hola! ¿Qué mesa?\n"));
    }

    #[test]
    fn template_uses_the_configured_trigger() {
        let template = summary_template("Pedido confirmado:");
        assert!(is_order_summary(&template, "Pedido confirmado:"));
        assert!(!is_order_summary(&template, "Resumen del Pedido:"));
    }

    #[test]
    fn filled_template_is_understood_by_the_parser() {
        let filled = summary_template("Resumen del Pedido:")
            .replace("{mesa}", "4")
            .replace("{nombre_plato_1}", "Campero")
            .replace("{precio_plato_1}", "7.50")
            .replace("{cantidad_plato_1}", "1")
            .replace("{nombre_extra_1}", "Queso")
            .replace("{precio_extra_1}", "1.00")
            .replace("{cantidad_extra_1}", "1")
            .replace("{nombre_sin_1}", "Cebolla")
            .replace("{nombre_plato_2}", "Patatas")
            .replace("{precio_plato_2}", "3.00")
            .replace("{cantidad_plato_2}", "2")
            .replace("{nombre_bebida_1}", "Agua")
            .replace("{precio_bebida_1}", "1.50")
            .replace("{cantidad_bebida_1}", "1")
            .replace("{total}", "0.00");

        let order = parse_order_summary(&filled).expect("parse filled template");
        assert_eq!(order.table_number, Some(4));
        assert_eq!(order.items.len(), 3);
        assert_eq!(order.total, Decimal::new(1600, 2));
    }
}
