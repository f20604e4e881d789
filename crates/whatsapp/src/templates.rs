//! Customer-facing notices sent outside the agent's own replies.

use comanda_core::domain::order::OrderNumber;

pub const FAREWELL: &str = "¡Hasta luego! 👋";

pub fn payment_confirmed(order_number: &OrderNumber) -> String {
    format!(
        "✅ Hemos recibido el pago del pedido {order_number}. ¡Gracias! Enseguida lo preparamos."
    )
}

pub fn payment_failed(order_number: &OrderNumber) -> String {
    format!(
        "❌ El pago del pedido {order_number} no se ha completado. \
         Escríbeme cuando quieras y te envío un nuevo enlace de pago para los mismos productos."
    )
}

pub fn payment_link_reissued(
    previous: &OrderNumber,
    order_number: &OrderNumber,
    link: &str,
) -> String {
    format!(
        "🔁 He vuelto a registrar los productos del pedido {previous} \
         como pedido {order_number}.\n\n{}",
        payment_link(link)
    )
}

pub fn payment_link(link: &str) -> String {
    format!("💳 Puedes pagar tu pedido aquí: {link}")
}

pub fn order_not_understood() -> String {
    "Lo siento, no he podido entender el pedido. ¿Podrías repetirlo indicando los platos y bebidas?"
        .to_string()
}

pub fn order_not_registered() -> String {
    "Lo siento, no hemos podido registrar tu pedido. Por favor, inténtalo de nuevo en unos minutos."
        .to_string()
}

pub fn table_out_of_range(min: u32, max: u32) -> String {
    format!("No encuentro esa mesa. ¿Puedes confirmar tu número de mesa (entre {min} y {max})?")
}

pub fn voice_not_supported() -> String {
    "Ahora mismo no puedo escuchar notas de voz. ¿Me lo escribes, por favor?".to_string()
}

pub fn assistant_unavailable() -> String {
    "Lo siento, ahora mismo no puedo atenderte. Inténtalo de nuevo en unos minutos.".to_string()
}

#[cfg(test)]
mod tests {
    use comanda_core::domain::order::OrderNumber;

    use super::{payment_confirmed, payment_failed, payment_link_reissued, table_out_of_range};

    #[test]
    fn payment_notices_name_the_order() {
        let number = OrderNumber::from_sequence(12);
        assert!(payment_confirmed(&number).contains("000000000012"));
        assert!(payment_failed(&number).contains("000000000012"));
        assert!(payment_failed(&number).contains("nuevo enlace"));
    }

    #[test]
    fn reissued_link_names_both_orders() {
        let body = payment_link_reissued(
            &OrderNumber::from_sequence(1),
            &OrderNumber::from_sequence(2),
            "https://pedidos.example.com/pay",
        );
        assert!(body.contains("000000000001"));
        assert!(body.contains("pedido 000000000002"));
        assert!(body.ends_with("https://pedidos.example.com/pay"));
    }

    #[test]
    fn table_notice_states_the_valid_range() {
        assert!(table_out_of_range(1, 12).contains("entre 1 y 12"));
    }
}
