mod checkout;
mod helpers;
mod notifications;
