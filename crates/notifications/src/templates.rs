//! Email bodies for every notification the marketplace sends.
//!
//! Bodies are small HTML fragments built with `format!`. Every value that
//! comes from a user or vendor goes through [`escape`].

use std::fmt::Write as _;

use domain::{Cart, Order, VendorProfile};
use fulfillment::DispatchReport;

use crate::jobs::VendorInvoice;

/// Who a notification is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    Customer(String),
    Vendor(String),
    /// The operations mailbox, if one is configured.
    Ops,
}

/// A notification and the data it is rendered from.
#[derive(Debug, Clone)]
pub enum Notification {
    OrderConfirmation(Order),
    AbandonedCart { cart: Cart, email: String },
    OrderDelivered(Order),
    ReviewRequest(Order),
    SlaBreach { order: Order, age_hours: i64 },
    DispatchRejected(DispatchReport),
    VendorInvoice { vendor: VendorProfile, invoice: VendorInvoice },
}

/// A notification rendered to subject and HTML body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub recipient: Recipient,
    pub subject: String,
    pub html: String,
}

impl Notification {
    /// Stable name used in logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::OrderConfirmation(_) => "order_confirmation",
            Notification::AbandonedCart { .. } => "abandoned_cart",
            Notification::OrderDelivered(_) => "order_delivered",
            Notification::ReviewRequest(_) => "review_request",
            Notification::SlaBreach { .. } => "sla_breach",
            Notification::DispatchRejected(_) => "dispatch_rejected",
            Notification::VendorInvoice { .. } => "vendor_invoice",
        }
    }

    pub fn render(&self) -> Rendered {
        match self {
            Notification::OrderConfirmation(order) => order_confirmation(order),
            Notification::AbandonedCart { cart, email } => abandoned_cart(cart, email),
            Notification::OrderDelivered(order) => order_delivered(order),
            Notification::ReviewRequest(order) => review_request(order),
            Notification::SlaBreach { order, age_hours } => sla_breach(order, *age_hours),
            Notification::DispatchRejected(report) => dispatch_rejected(report),
            Notification::VendorInvoice { vendor, invoice } => vendor_invoice(vendor, invoice),
        }
    }
}

fn order_confirmation(order: &Order) -> Rendered {
    let address = order.shipping_address();
    let mut html = format!(
        "<h1>Thank you for your order, {}!</h1>\
         <p>Order <strong>{}</strong> has been placed.</p>",
        escape(&address.name),
        order.id().short(),
    );
    html.push_str(&item_table(
        order
            .items()
            .iter()
            .map(|i| (i.product_name.as_str(), i.quantity, i.total_price().to_string())),
    ));
    let _ = write!(
        html,
        "<p>Total: <strong>{}</strong> ({})</p>\
         <p>Shipping to: {}, {}, {} {}</p>\
         <p>Items from different sellers may arrive in separate parcels.</p>",
        order.total_amount(),
        order.payment_method().as_str(),
        escape(&address.address_line1),
        escape(&address.city),
        escape(&address.state),
        address.pincode,
    );

    Rendered {
        recipient: Recipient::Customer(order.contact_email().to_string()),
        subject: format!("Order confirmed: {}", order.id().short()),
        html,
    }
}

fn abandoned_cart(cart: &Cart, email: &str) -> Rendered {
    let mut html = String::from(
        "<h1>You left something behind</h1><p>Your cart is still waiting for you:</p>",
    );
    html.push_str(&item_table(
        cart.items()
            .iter()
            .map(|i| (i.product_name.as_str(), i.quantity, i.total_price().to_string())),
    ));
    let _ = write!(html, "<p>Cart total: <strong>{}</strong></p>", cart.subtotal());

    Rendered {
        recipient: Recipient::Customer(email.to_string()),
        subject: "Your cart is waiting".to_string(),
        html,
    }
}

fn order_delivered(order: &Order) -> Rendered {
    Rendered {
        recipient: Recipient::Customer(order.contact_email().to_string()),
        subject: format!("Delivered: order {}", order.id().short()),
        html: format!(
            "<h1>Your order has arrived</h1>\
             <p>Every parcel of order <strong>{}</strong> has been delivered to {}.</p>",
            order.id().short(),
            escape(&order.shipping_address().city),
        ),
    }
}

fn review_request(order: &Order) -> Rendered {
    let mut html = format!(
        "<h1>How was your order?</h1>\
         <p>Tell other shoppers what you think of the items from order <strong>{}</strong>:</p><ul>",
        order.id().short(),
    );
    for item in order.items() {
        let _ = write!(html, "<li>{}</li>", escape(&item.product_name));
    }
    html.push_str("</ul>");

    Rendered {
        recipient: Recipient::Customer(order.contact_email().to_string()),
        subject: "Review your recent purchase".to_string(),
        html,
    }
}

fn sla_breach(order: &Order, age_hours: i64) -> Rendered {
    Rendered {
        recipient: Recipient::Ops,
        subject: format!("SLA breach: order {} is {age_hours}h old", order.id().short()),
        html: format!(
            "<p>Order <strong>{}</strong> was placed {} and is still <strong>{}</strong> \
             after {age_hours} hours.</p><p>Vendors: {}</p>",
            order.id(),
            order.created_at().format("%Y-%m-%d %H:%M UTC"),
            order.status(),
            order.vendor_ids().len(),
        ),
    }
}

fn dispatch_rejected(report: &DispatchReport) -> Rendered {
    let mut html = format!(
        "<p>Order <strong>{}</strong> has vendor shipments that need attention \
         (order status {}):</p><ul>",
        report.order_id, report.order_status,
    );
    for failed in report.needs_attention() {
        let _ = write!(
            html,
            "<li>vendor {}: {} ({})</li>",
            failed.vendor_id,
            escape(&failed.reason),
            failed.state,
        );
    }
    html.push_str("</ul><p>Fix the cause, reset the shipment and dispatch again.</p>");

    Rendered {
        recipient: Recipient::Ops,
        subject: format!("Dispatch needs attention: order {}", report.order_id.short()),
        html,
    }
}

fn vendor_invoice(vendor: &VendorProfile, invoice: &VendorInvoice) -> Rendered {
    Rendered {
        recipient: Recipient::Vendor(vendor.email.clone()),
        subject: format!("Statement for {}", invoice.month),
        html: format!(
            "<h1>Monthly statement: {}</h1>\
             <p>Hello {},</p>\
             <table>\
             <tr><td>Delivered orders</td><td>{}</td></tr>\
             <tr><td>Units sold</td><td>{}</td></tr>\
             <tr><td>Gross sales</td><td>{}</td></tr>\
             <tr><td>Commission ({}%)</td><td>{}</td></tr>\
             <tr><td><strong>Payout</strong></td><td><strong>{}</strong></td></tr>\
             </table>",
            invoice.month,
            escape(&vendor.business_name),
            invoice.order_count,
            invoice.units,
            invoice.gross,
            invoice.commission_percent,
            invoice.commission,
            invoice.payout,
        ),
    }
}

fn item_table<'a>(rows: impl Iterator<Item = (&'a str, u32, String)>) -> String {
    let mut html = String::from("<table><tr><th>Item</th><th>Qty</th><th>Price</th></tr>");
    for (name, quantity, price) in rows {
        let _ = write!(
            html,
            "<tr><td>{}</td><td>{quantity}</td><td>{price}</td></tr>",
            escape(name)
        );
    }
    html.push_str("</table>");
    html
}

/// Escapes text for an HTML body.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
